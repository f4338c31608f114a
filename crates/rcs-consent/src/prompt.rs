use std::io;
use std::time::Duration;

use async_trait::async_trait;
use rcs_proto::v1::ConsentRequest;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Allow,
    Deny,
}

/// Presents one request to the local user and waits for an explicit answer.
///
/// The surface enforces the countdown by dropping the returned future when it
/// elapses, so implementations need not time out themselves.
#[async_trait]
pub trait Prompter: Send {
    async fn prompt(
        &mut self,
        request: &ConsentRequest,
        countdown: Duration,
    ) -> io::Result<PromptAnswer>;
}

/// Reads `y`/`n` answers from standard input.
pub struct TerminalPrompter {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

/// Only an explicit yes allows.
pub fn parse_answer(line: &str) -> PromptAnswer {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => PromptAnswer::Allow,
        _ => PromptAnswer::Deny,
    }
}

fn describe(request: &ConsentRequest, countdown: Duration) -> String {
    let minutes = request.max_session_seconds.div_ceil(60);
    format!(
        "\n{} is asking to control this computer's mouse and keyboard for up to {} minute{}.\n\
         Allow? [y/N] (denied automatically in {}s): ",
        request.requested_by,
        minutes,
        if minutes == 1 { "" } else { "s" },
        countdown.as_secs()
    )
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt(
        &mut self,
        request: &ConsentRequest,
        countdown: Duration,
    ) -> io::Result<PromptAnswer> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(describe(request, countdown).as_bytes()).await?;
        stdout.flush().await?;

        // EOF denies
        Ok(match self.lines.next_line().await? {
            Some(line) => parse_answer(&line),
            None => PromptAnswer::Deny,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rcs_proto::v1::SessionId;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), PromptAnswer::Allow);
        assert_eq!(parse_answer(" YES \n"), PromptAnswer::Allow);
        assert_eq!(parse_answer("n"), PromptAnswer::Deny);
        assert_eq!(parse_answer(""), PromptAnswer::Deny);
        assert_eq!(parse_answer("sure"), PromptAnswer::Deny);
    }

    #[test]
    fn test_description_mentions_requester_and_limits() {
        let request = ConsentRequest {
            session_id: SessionId::from_wire("ab".repeat(32)),
            requested_by: "ms.ito".into(),
            approval_timeout_seconds: 30,
            max_session_seconds: 90,
            issued_at: Utc::now(),
        };
        let text = describe(&request, Duration::from_secs(27));
        assert!(text.contains("ms.ito"));
        assert!(text.contains("2 minutes"));
        assert!(text.contains("27s"));
    }
}
