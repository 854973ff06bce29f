//! CLI argument definitions for owafetch.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! running the fetch.

use std::path::PathBuf;

use clap::Parser;

/// owafetch -- fetch mail from Exchange Outlook Web Access and relay it
/// over SMTP.
#[derive(Parser, Debug)]
#[command(
    name = "owafetch",
    version,
    about = "Fetch mail from an Exchange OWA (WebDAV) mailbox and relay it over SMTP",
    long_about = "Logs in to Outlook Web Access with form-based authentication, lists the \
                  unread (or all) messages of the inbox, forwards each one to an SMTP \
                  server and then marks it read or deletes it. Settings come from a \
                  fetchExc-style properties file."
)]
pub struct Cli {
    /// Properties file (`key = value` lines, or TOML with a `.toml` extension).
    pub properties_file: PathBuf,

    /// Print the properties found in the properties file and exit.
    #[arg(long, short)]
    pub print: bool,

    /// Only output error messages.
    #[arg(long, short)]
    pub silent: bool,

    /// Only list the messages; nothing is fetched, forwarded or changed.
    #[arg(long, short)]
    pub list: bool,

    /// Fetch all messages (default: only unread messages).
    #[arg(long, short)]
    pub all: bool,

    /// Produce verbose output.
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Default log level implied by the output flags.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.silent {
            "error"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_file() {
        let cli = Cli::try_parse_from(["owafetch", "-a", "-l", "fetch.properties"]).unwrap();
        assert!(cli.all);
        assert!(cli.list);
        assert!(!cli.print);
        assert_eq!(cli.properties_file, PathBuf::from("fetch.properties"));
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn properties_file_is_required() {
        assert!(Cli::try_parse_from(["owafetch", "-v"]).is_err());
    }

    #[test]
    fn verbose_beats_silent() {
        let cli = Cli::try_parse_from(["owafetch", "-s", "-v", "x"]).unwrap();
        assert_eq!(cli.log_level(), "debug");
        let cli = Cli::try_parse_from(["owafetch", "--silent", "x"]).unwrap();
        assert_eq!(cli.log_level(), "error");
    }
}
