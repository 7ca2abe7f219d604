//! Terminal frontend for the reconciliation wizard.
//!
//! Each new-site step asks for project, location and depth on separate lines.
//! Projects and locations already in storage are listed with numbers; typing
//! a number picks that entry. `<` goes back one step and `q` cancels.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use labnote_core::{count_noun, FinishPrompt, Prompter, Reply, SiteInput, SitePrompt};

const BACK: &str = "<";
const CANCEL: &str = "q";

enum Answer {
    Value(String),
    Back,
    Cancel,
}

/// [`Prompter`] over a line reader and a writer (stdin/stdout in the binary).
pub struct TerminalPrompter<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> TerminalPrompter<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    async fn write(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn ask(&mut self, label: &str, choices: &[String]) -> io::Result<Answer> {
        let mut text = String::new();
        for (i, choice) in choices.iter().enumerate() {
            text.push_str(&format!("  {}) {}\n", i + 1, choice));
        }
        text.push_str(label);
        text.push_str(": ");
        self.write(&text).await?;

        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(Answer::Cancel);
        }
        Ok(match line.trim() {
            BACK => Answer::Back,
            CANCEL => Answer::Cancel,
            answer => Answer::Value(pick(answer, choices)),
        })
    }

    async fn site_form(&mut self, prompt: &SitePrompt) -> io::Result<Reply<SiteInput>> {
        let mut header = format!(
            "\nNew site {} for {} ({}/{}), '{BACK}' goes back, '{CANCEL}' cancels\n",
            prompt.site_id, prompt.animal_id, prompt.step, prompt.total
        );
        if let Some(error) = &prompt.error {
            header.push_str(&format!("error: {error}\n"));
        }
        self.write(&header).await?;

        let mut values = Vec::with_capacity(3);
        for (label, choices) in [
            ("Project", prompt.projects.as_slice()),
            ("Location", prompt.locations.as_slice()),
            ("Depth", &[][..]),
        ] {
            match self.ask(label, choices).await? {
                Answer::Value(v) => values.push(v),
                Answer::Back => return Ok(Reply::Back),
                Answer::Cancel => return Ok(Reply::Cancel),
            }
        }
        let [project, location, depth]: [String; 3] = values
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "incomplete site form"))?;
        Ok(Reply::Submit(SiteInput::new(project, location, depth)))
    }

    async fn finish_form(&mut self, prompt: &FinishPrompt) -> io::Result<Reply<()>> {
        let mut summary = format!(
            "\nReady to export {} for {}",
            count_noun(prompt.record_count as u64, "row"),
            prompt.animal_id
        );
        if !prompt.sites_created.is_empty() {
            summary.push_str(&format!(
                " ({} created)",
                count_noun(prompt.sites_created.len() as u64, "new site")
            ));
        }
        summary.push('\n');
        self.write(&summary).await?;

        Ok(match self.ask("Commit? [y/N]", &[]).await? {
            Answer::Value(v) if v.eq_ignore_ascii_case("y") || v.eq_ignore_ascii_case("yes") => {
                Reply::Submit(())
            }
            Answer::Back => Reply::Back,
            _ => Reply::Cancel,
        })
    }
}

/// A 1-based number selects from `choices`; anything else is taken verbatim.
fn pick(answer: &str, choices: &[String]) -> String {
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| choices.get(i))
        .cloned()
        .unwrap_or_else(|| answer.to_string())
}

fn io_cancel<T>(error: io::Error) -> Reply<T> {
    warn!(
        subsystem = "cli",
        component = "prompt",
        error = %error,
        "Terminal I/O failed, cancelling export"
    );
    Reply::Cancel
}

#[async_trait]
impl<R, W> Prompter for TerminalPrompter<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn new_site(&mut self, prompt: &SitePrompt) -> Reply<SiteInput> {
        self.site_form(prompt).await.unwrap_or_else(io_cancel)
    }

    async fn confirm(&mut self, prompt: &FinishPrompt) -> Reply<()> {
        self.finish_form(prompt).await.unwrap_or_else(io_cancel)
    }
}
