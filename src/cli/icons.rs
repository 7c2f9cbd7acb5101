//! Glyphs for command output and per-file download outcomes.

use console::{style, StyledObject};

use partyfetch::services::download::TaskOutcome;

/// Completed step (green ✓).
pub fn ok() -> StyledObject<&'static str> {
    style("✓").green()
}

/// Start of a section, e.g. a creator run (cyan →).
pub fn heading() -> StyledObject<&'static str> {
    style("→").cyan()
}

/// Secondary line under a heading.
pub fn detail() -> StyledObject<&'static str> {
    style("→").dim()
}

/// Needs a look but is not fatal (yellow !).
pub fn attention() -> StyledObject<&'static str> {
    style("!").yellow()
}

/// Fatal for the thing it labels (red ✗).
pub fn failure() -> StyledObject<&'static str> {
    style("✗").red()
}

/// Glyph for where a file ended up after a pass.
pub fn outcome(outcome: &TaskOutcome) -> StyledObject<&'static str> {
    match outcome {
        TaskOutcome::Downloaded { .. } => ok(),
        TaskOutcome::AlreadyExists => style("=").dim(),
        TaskOutcome::SkippedBlacklisted => style("-").dim(),
        TaskOutcome::Blacklisted { .. } => style("⊘").yellow(),
        TaskOutcome::Failed { .. } => failure(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_glyphs() {
        let cases = [
            (TaskOutcome::Downloaded { bytes: 1 }, "✓"),
            (TaskOutcome::AlreadyExists, "="),
            (TaskOutcome::SkippedBlacklisted, "-"),
            (
                TaskOutcome::Blacklisted {
                    reason: "HTTP 500".to_string(),
                },
                "⊘",
            ),
            (
                TaskOutcome::Failed {
                    error: "reset".to_string(),
                },
                "✗",
            ),
        ];
        for (result, glyph) in cases {
            assert!(outcome(&result).to_string().contains(glyph), "{:?}", result);
        }
    }
}
