//! Comment text generation.
//!
//! The [`CommentGenerator`] trait decouples the session loop from the text
//! backend. The production backend renders a prompt from the current snapshot
//! and pipes it to an external oracle command. Tests use scripted generators.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, instrument};

use crate::core::snapshot::ContentSnapshot;
use crate::io::process::run_checked;

const COMMENT_TEMPLATE: &str = include_str!("prompts/comment.md");

/// Hard cap on comment length; anything longer is an oracle malfunction.
pub const MAX_COMMENT_LEN: usize = 160;

/// Abstraction over comment text backends.
pub trait CommentGenerator {
    /// Produce one comment for the profile in the requested style.
    fn generate(&self, snapshot: &ContentSnapshot, style: &str) -> Result<String>;
}

/// Generator that pipes a rendered prompt through an external oracle command.
pub struct OracleGenerator {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommentGenerator for OracleGenerator {
    #[instrument(skip_all, fields(style))]
    fn generate(&self, snapshot: &ContentSnapshot, style: &str) -> Result<String> {
        let prompt = render_prompt(snapshot, style)?;
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let stdout = run_checked(
            cmd,
            "comment oracle",
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;
        let comment = sanitize_comment(&String::from_utf8_lossy(&stdout))?;
        debug!(len = comment.len(), "generated comment");
        Ok(comment)
    }
}

/// Render the comment prompt for the snapshot.
pub fn render_prompt(snapshot: &ContentSnapshot, style: &str) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("comment", COMMENT_TEMPLATE)
        .context("comment template")?;
    let template = env.get_template("comment")?;
    let rendered = template.render(context! {
        style => style,
        max_len => MAX_COMMENT_LEN,
        name => snapshot.identity.get("name").filter(|n| !n.is_empty()),
        body_text => snapshot.body_text,
    })?;
    Ok(rendered)
}

/// Trim and bound oracle output. Empty or oversized output is an error so the
/// caller can fall back to a plain like.
pub fn sanitize_comment(raw: &str) -> Result<String> {
    let comment = raw.trim().trim_matches('"').trim();
    if comment.is_empty() {
        return Err(anyhow!("comment oracle returned no text"));
    }
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(anyhow!(
            "comment oracle returned {} chars (cap {MAX_COMMENT_LEN})",
            comment.chars().count()
        ));
    }
    if comment.lines().count() > 1 {
        return Err(anyhow!("comment oracle returned multiple lines"));
    }
    Ok(comment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::profile_snapshot;

    #[test]
    fn prompt_includes_style_and_profile_text() {
        let snapshot = profile_snapshot("Jess", &["loves hiking", "ask me about dogs"], &[]);
        let prompt = render_prompt(&snapshot, "playful").expect("render");
        assert!(prompt.contains("Style: playful"));
        assert!(prompt.contains("Name: Jess"));
        assert!(prompt.contains("loves hiking"));
        assert!(prompt.contains("ask me about dogs"));
    }

    #[test]
    fn sanitize_trims_quotes_and_whitespace() {
        assert_eq!(
            sanitize_comment("  \"love that trail\"\n").expect("sanitize"),
            "love that trail"
        );
    }

    #[test]
    fn sanitize_rejects_empty_and_oversized() {
        assert!(sanitize_comment("   \n").is_err());
        assert!(sanitize_comment(&"x".repeat(MAX_COMMENT_LEN + 1)).is_err());
        assert!(sanitize_comment("two\nlines").is_err());
    }
}
