//! Console log format: every output line starts with a level marker,
//! `--` for info, `(W)`, `(E)` and `(D)` for the rest.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Initialize the tracing subscriber; `RUST_LOG` overrides the flags.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(MarkedLines)
        .init();
}

pub fn level_marker(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "(E)",
        Level::WARN => "(W)",
        Level::INFO => "--",
        Level::DEBUG | Level::TRACE => "(D)",
    }
}

/// Prefix each line of `text` with `marker`.
pub fn mark_lines(marker: &str, text: &str) -> String {
    text.lines()
        .map(|line| format!("{marker} {line}\n"))
        .collect()
}

/// Event formatter writing the message and fields behind a level marker.
pub struct MarkedLines;

impl<S, N> FormatEvent<S, N> for MarkedLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut text = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut text), event)?;
        if text.is_empty() {
            text.push('\n');
        }
        let marker = level_marker(event.metadata().level());
        write!(writer, "{}", mark_lines(marker, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_per_level() {
        assert_eq!(level_marker(&Level::ERROR), "(E)");
        assert_eq!(level_marker(&Level::WARN), "(W)");
        assert_eq!(level_marker(&Level::INFO), "--");
        assert_eq!(level_marker(&Level::DEBUG), "(D)");
        assert_eq!(level_marker(&Level::TRACE), "(D)");
    }

    #[test]
    fn every_line_is_marked() {
        assert_eq!(
            mark_lines("(W)", "first\nsecond"),
            "(W) first\n(W) second\n"
        );
        assert_eq!(mark_lines("--", "one"), "-- one\n");
    }

    #[test]
    fn blank_event_still_gets_a_marker() {
        assert_eq!(mark_lines("--", "\n"), "-- \n");
    }
}
