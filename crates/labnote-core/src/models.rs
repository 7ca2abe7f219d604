//! Data models for labnote.
//!
//! A [`Record`] is one row of the recordings table: the literal cell text is
//! kept next to the coerced values so diagnostics can quote what the user
//! actually typed.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::DateTimeFormats;
use crate::defaults;

/// One extracted table row, keyed by header name.
pub type RawRow = HashMap<String, String>;

// =============================================================================
// RECORD
// =============================================================================

/// Literal cell text of one row, trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFields {
    pub date: String,
    pub time: String,
    pub stack_id: String,
    pub exp_id: String,
    pub site_id: String,
    pub comment: String,
    pub paradigm: String,
}

impl RawFields {
    /// Pick the recordings columns out of an extracted row. Absent columns
    /// read as empty.
    pub fn from_row(row: &RawRow) -> Self {
        let cell = |header: &str| row.get(header).cloned().unwrap_or_default();
        Self {
            date: cell(defaults::HEADER_DATE),
            time: cell(defaults::HEADER_TIME),
            stack_id: cell(defaults::HEADER_STACK_ID),
            exp_id: cell(defaults::HEADER_EXP_ID),
            site_id: cell(defaults::HEADER_SITE_ID),
            comment: cell(defaults::HEADER_COMMENT),
            paradigm: cell(defaults::HEADER_PARADIGM),
        }
        .trimmed()
    }

    /// Every cell with surrounding whitespace removed.
    pub fn trimmed(self) -> Self {
        let trim = |s: String| s.trim().to_string();
        Self {
            date: trim(self.date),
            time: trim(self.time),
            stack_id: trim(self.stack_id),
            exp_id: trim(self.exp_id),
            site_id: trim(self.site_id),
            comment: trim(self.comment),
            paradigm: trim(self.paradigm),
        }
    }

    /// No cell holds any text.
    pub fn is_blank(&self) -> bool {
        [
            &self.date,
            &self.time,
            &self.stack_id,
            &self.exp_id,
            &self.site_id,
            &self.comment,
            &self.paradigm,
        ]
        .iter()
        .all(|cell| cell.is_empty())
    }
}

/// A typed table row.
///
/// Fields are private: a record is built once by [`Record::parse`] and every
/// derived predicate is a pure function of what was parsed. Changing row data
/// means parsing a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    position: usize,
    raw: RawFields,
    timestamp: Option<NaiveDateTime>,
    stack_id: Option<i64>,
    exp_id: Option<i64>,
    site_id: Option<i64>,
    comment: Option<String>,
    paradigm: Option<String>,
}

impl Record {
    /// Coerce raw cells into a record. Never fails: a cell that does not
    /// coerce leaves its field absent, which [`Record::is_invalid`] reports.
    pub fn parse(position: usize, raw: RawFields, formats: &DateTimeFormats) -> Self {
        let raw = raw.trimmed();
        let timestamp = parse_timestamp(&raw.date, &raw.time, formats);
        Self {
            position,
            timestamp,
            stack_id: parse_id(&raw.stack_id),
            exp_id: parse_id(&raw.exp_id),
            site_id: parse_id(&raw.site_id),
            comment: non_empty(&raw.comment),
            paradigm: non_empty(&raw.paradigm),
            raw,
        }
    }

    /// Build a record straight from an extracted row.
    pub fn from_row(position: usize, row: &RawRow, formats: &DateTimeFormats) -> Self {
        Self::parse(position, RawFields::from_row(row), formats)
    }

    /// 1-based row position in the source table.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn raw(&self) -> &RawFields {
        &self.raw
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    pub fn stack_id(&self) -> Option<i64> {
        self.stack_id
    }

    pub fn exp_id(&self) -> Option<i64> {
        self.exp_id
    }

    pub fn site_id(&self) -> Option<i64> {
        self.site_id
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn paradigm(&self) -> Option<&str> {
        self.paradigm.as_deref()
    }

    /// No parsed field is present.
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.stack_id.is_none()
            && self.exp_id.is_none()
            && self.site_id.is_none()
            && self.comment.is_none()
            && self.paradigm.is_none()
    }

    /// Nothing was typed in the row. Unlike [`Record::is_empty`], a row whose
    /// every cell failed to coerce is not blank.
    pub fn is_blank(&self) -> bool {
        self.is_empty() && !self.is_invalid()
    }

    /// Every identity-bearing field is present. Comment and paradigm are
    /// optional.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Some cell had text that failed to coerce.
    pub fn is_invalid(&self) -> bool {
        !self.invalid_fields().is_empty()
    }

    /// Headers of identity-bearing columns with no parsed value.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.timestamp.is_none() {
            missing.push("Date/Time");
        }
        if self.stack_id.is_none() {
            missing.push(defaults::HEADER_STACK_ID);
        }
        if self.exp_id.is_none() {
            missing.push(defaults::HEADER_EXP_ID);
        }
        if self.site_id.is_none() {
            missing.push(defaults::HEADER_SITE_ID);
        }
        missing
    }

    /// Columns whose text was present but did not coerce, paired with that
    /// text.
    pub fn invalid_fields(&self) -> Vec<(&'static str, String)> {
        let mut invalid = Vec::new();
        if self.timestamp.is_none() && !(self.raw.date.is_empty() && self.raw.time.is_empty()) {
            invalid.push((
                "Date/Time",
                format!("{} {}", self.raw.date, self.raw.time).trim().to_string(),
            ));
        }
        let ids = [
            (defaults::HEADER_STACK_ID, &self.raw.stack_id, self.stack_id),
            (defaults::HEADER_EXP_ID, &self.raw.exp_id, self.exp_id),
            (defaults::HEADER_SITE_ID, &self.raw.site_id, self.site_id),
        ];
        for (header, raw, parsed) in ids {
            if parsed.is_none() && !raw.is_empty() {
                invalid.push((header, raw.clone()));
            }
        }
        invalid
    }

    /// Experiment row for a complete record.
    pub fn experiment_row(&self) -> Option<ExperimentRow> {
        Some(ExperimentRow {
            id: self.exp_id?,
            site_id: self.site_id?,
        })
    }

    /// Stack row for a complete record, with the timestamp split into the
    /// local date and time strings storage expects.
    pub fn stack_row(&self) -> Option<StackRow> {
        let timestamp = self.timestamp?;
        Some(StackRow {
            id: self.stack_id?,
            exp_id: self.exp_id?,
            date: timestamp
                .format(defaults::STORAGE_DATE_FORMAT)
                .to_string(),
            time: timestamp
                .format(defaults::STORAGE_TIME_FORMAT)
                .to_string(),
            paradigm: self.paradigm.clone(),
            comment: self.comment.clone(),
        })
    }

    /// A record introducing a brand-new site: stack, experiment and site
    /// share the id.
    pub fn introduces_site(&self, site_id: i64) -> bool {
        self.site_id == Some(site_id)
            && self.exp_id == Some(site_id)
            && self.stack_id == Some(site_id)
    }
}

fn parse_timestamp(date: &str, time: &str, formats: &DateTimeFormats) -> Option<NaiveDateTime> {
    if date.is_empty() && time.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), &formats.combined()).ok()
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

fn non_empty(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

// =============================================================================
// IDENTITY SETS
// =============================================================================

/// Distinct ids referenced by a batch, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentitySets {
    pub stack_ids: BTreeSet<i64>,
    pub exp_ids: BTreeSet<i64>,
    pub site_ids: BTreeSet<i64>,
}

impl IdentitySets {
    /// Collect ids from every non-blank record.
    pub fn from_records(records: &[Record]) -> Self {
        let mut sets = Self::default();
        for record in records.iter().filter(|r| !r.is_blank()) {
            sets.stack_ids.extend(record.stack_id);
            sets.exp_ids.extend(record.exp_id);
            sets.site_ids.extend(record.site_id);
        }
        sets
    }

    /// Ids of one entity kind as a sorted vector.
    pub fn ids(&self, kind: EntityKind) -> Vec<i64> {
        let set = match kind {
            EntityKind::Site => &self.site_ids,
            EntityKind::Experiment => &self.exp_ids,
            EntityKind::Stack => &self.stack_ids,
        };
        set.iter().copied().collect()
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Relational entities owned (transitively) by an animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Stack,
    Experiment,
    Site,
}

impl EntityKind {
    /// Order used when reporting ownership conflicts.
    pub const ALL: [EntityKind; 3] = [EntityKind::Stack, EntityKind::Experiment, EntityKind::Site];

    /// Label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Stack => "StackIDs",
            EntityKind::Experiment => "ExpIDs",
            EntityKind::Site => "SiteIDs",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Stack => write!(f, "stack"),
            EntityKind::Experiment => write!(f, "experiment"),
            EntityKind::Site => write!(f, "site"),
        }
    }
}

/// A site collected by the wizard, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSite {
    pub id: i64,
    pub animal_id: String,
    pub project: String,
    pub location: String,
    pub depth: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRow {
    pub id: i64,
    pub site_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRow {
    pub id: i64,
    pub exp_id: i64,
    /// Local date, `STORAGE_DATE_FORMAT`.
    pub date: String,
    /// Local time, `STORAGE_TIME_FORMAT`.
    pub time: String,
    pub paradigm: Option<String>,
    pub comment: Option<String>,
}

/// An animal as listed for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animal {
    pub id: String,
    pub pi: Option<String>,
}

// =============================================================================
// REPORTING
// =============================================================================

/// Result of one update-then-insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Aggregate counters of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub inserted_experiments: u64,
    pub updated_experiments: u64,
    pub inserted_stacks: u64,
    pub updated_stacks: u64,
}

impl UpsertReport {
    pub fn record_experiment(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted_experiments += 1,
            UpsertOutcome::Updated => self.updated_experiments += 1,
        }
    }

    pub fn record_stack(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted_stacks += 1,
            UpsertOutcome::Updated => self.updated_stacks += 1,
        }
    }

    /// Rows newly created by the batch.
    pub fn inserted(&self) -> u64 {
        self.inserted_experiments + self.inserted_stacks
    }
}

impl fmt::Display for UpsertReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inserted {}, updated {}, inserted {}, updated {}",
            count_noun(self.inserted_experiments, "experiment"),
            count_noun(self.updated_experiments, "experiment"),
            count_noun(self.inserted_stacks, "stack"),
            count_noun(self.updated_stacks, "stack")
        )
    }
}

/// `count` followed by `noun`, pluralised with a trailing `s` unless it is one.
pub fn count_noun(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(date: &str, time: &str, stack: &str, exp: &str, site: &str) -> RawFields {
        RawFields {
            date: date.to_string(),
            time: time.to_string(),
            stack_id: stack.to_string(),
            exp_id: exp.to_string(),
            site_id: site.to_string(),
            ..Default::default()
        }
    }

    fn parse(fields: RawFields) -> Record {
        Record::parse(1, fields, &DateTimeFormats::default())
    }

    #[test]
    fn test_complete_record() {
        let record = parse(raw("2024-03-05", "14:30", "7", "3", "2"));
        assert!(record.is_complete());
        assert!(!record.is_invalid());
        assert!(!record.is_empty());
        assert_eq!(
            record.timestamp(),
            Some(
                NaiveDate::from_ymd_opt(2024, 3, 5)
                    .unwrap()
                    .and_hms_opt(14, 30, 0)
                    .unwrap()
            )
        );
        assert_eq!(record.stack_id(), Some(7));
        assert_eq!(record.exp_id(), Some(3));
        assert_eq!(record.site_id(), Some(2));
    }

    #[test]
    fn test_empty_record_ignores_whitespace() {
        let record = parse(raw(" ", "", "", "", ""));
        assert!(record.is_empty());
        assert!(!record.is_invalid());
        assert!(!record.is_complete());
    }

    #[test]
    fn test_parse_trims_cells() {
        let record = parse(raw(" 2024-03-05 ", "\t14:30", " 7", "3 ", " 2 "));
        assert!(record.is_complete());
        assert!(!record.is_invalid());
        assert_eq!(record.raw().date, "2024-03-05");
        assert_eq!(record.stack_id(), Some(7));

        let blank = parse(raw("  ", " ", "\t", "", " "));
        assert!(blank.is_blank());
        assert!(blank.raw().is_blank());
    }

    #[test]
    fn test_empty_depends_on_parsed_fields_only() {
        // Unparsable text leaves every field absent: empty and invalid at once.
        let record = parse(raw("yesterday", "", "x", "", ""));
        assert!(record.is_empty());
        assert!(record.is_invalid());
        assert!(!record.is_blank());
        assert!(!record.raw().is_blank());
    }

    #[test]
    fn test_comment_alone_makes_record_non_empty() {
        let mut fields = RawFields::default();
        fields.comment = "electrode drifted".to_string();
        let record = parse(fields);
        assert!(!record.is_empty());
        assert!(!record.is_complete());
        assert_eq!(record.comment(), Some("electrode drifted"));
    }

    #[test]
    fn test_bad_date_is_invalid() {
        let record = parse(raw("2024-13-40", "10:00", "1", "1", "1"));
        assert!(record.is_invalid());
        assert!(record.timestamp().is_none());
        assert_eq!(
            record.invalid_fields(),
            vec![("Date/Time", "2024-13-40 10:00".to_string())]
        );
    }

    #[test]
    fn test_date_without_time_is_invalid() {
        let record = parse(raw("2024-03-05", "", "1", "1", "1"));
        assert!(record.is_invalid());
        assert!(!record.is_complete());
    }

    #[test]
    fn test_non_numeric_id_is_invalid() {
        let record = parse(raw("2024-03-05", "10:00", "12a", "1", "1"));
        assert!(record.is_invalid());
        assert_eq!(record.stack_id(), None);
        assert_eq!(
            record.invalid_fields(),
            vec![(defaults::HEADER_STACK_ID, "12a".to_string())]
        );
    }

    #[test]
    fn test_missing_id_is_incomplete_not_invalid() {
        let record = parse(raw("2024-03-05", "10:00", "", "1", "1"));
        assert!(!record.is_invalid());
        assert!(!record.is_complete());
        assert_eq!(record.missing_fields(), vec![defaults::HEADER_STACK_ID]);
    }

    #[test]
    fn test_custom_formats() {
        let formats = DateTimeFormats::new("%d.%m.%Y", "%H:%M:%S");
        let record = Record::parse(4, raw("05.03.2024", "09:15:30", "1", "1", "1"), &formats);
        assert!(record.is_complete());
        assert_eq!(record.position(), 4);

        let default_record = parse(raw("05.03.2024", "09:15:30", "1", "1", "1"));
        assert!(default_record.is_invalid());
    }

    #[test]
    fn test_stack_row_splits_timestamp() {
        let mut fields = raw("2024-03-05", "14:30", "7", "3", "2");
        fields.paradigm = "oddball".to_string();
        let row = parse(fields).stack_row().unwrap();
        assert_eq!(row.date, "2024-03-05");
        assert_eq!(row.time, "14:30:00");
        assert_eq!(row.paradigm.as_deref(), Some("oddball"));
        assert_eq!(row.comment, None);
    }

    #[test]
    fn test_incomplete_record_has_no_rows() {
        let record = parse(raw("2024-03-05", "14:30", "7", "", "2"));
        assert!(record.experiment_row().is_none());
        assert!(record.stack_row().is_none());
    }

    #[test]
    fn test_from_row_reads_headers() {
        let mut row = RawRow::new();
        row.insert("Date".to_string(), "2024-03-05".to_string());
        row.insert("Time".to_string(), "14:30".to_string());
        row.insert("StackID".to_string(), " 20 ".to_string());
        row.insert("ExpID".to_string(), "20".to_string());
        row.insert("SiteID".to_string(), "20".to_string());
        let record = Record::from_row(2, &row, &DateTimeFormats::default());
        assert!(record.introduces_site(20));
        assert!(!record.introduces_site(21));
        assert_eq!(record.raw().paradigm, "");
    }

    #[test]
    fn test_identity_sets_dedup_and_skip_empty() {
        let formats = DateTimeFormats::default();
        let records = vec![
            Record::parse(1, raw("2024-03-05", "10:00", "1", "1", "10"), &formats),
            Record::parse(2, raw("2024-03-05", "11:00", "2", "1", "10"), &formats),
            Record::parse(3, raw("", "", "", "", ""), &formats),
            Record::parse(4, raw("2024-03-05", "12:00", "3", "2", "20"), &formats),
        ];
        let sets = IdentitySets::from_records(&records);
        assert_eq!(sets.ids(EntityKind::Stack), vec![1, 2, 3]);
        assert_eq!(sets.ids(EntityKind::Experiment), vec![1, 2]);
        assert_eq!(sets.ids(EntityKind::Site), vec![10, 20]);
    }

    #[test]
    fn test_report_display() {
        let mut report = UpsertReport::default();
        report.record_experiment(UpsertOutcome::Inserted);
        report.record_stack(UpsertOutcome::Updated);
        report.record_stack(UpsertOutcome::Inserted);
        assert_eq!(
            report.to_string(),
            "Inserted 1 experiment, updated 0 experiments, inserted 1 stack, updated 1 stack"
        );
        assert_eq!(report.inserted(), 2);
    }

    #[test]
    fn test_count_noun() {
        assert_eq!(count_noun(0, "site"), "0 sites");
        assert_eq!(count_noun(1, "site"), "1 site");
        assert_eq!(count_noun(12, "row"), "12 rows");
    }
}
