use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "aura",
    version,
    about = "Compare two recordings: acoustic features plus four DTW alignments"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse and align exactly two audio files.
    Compare(CompareArgs),
    /// List stored comparison results.
    List(StoreArgs),
    /// Print a stored comparison result verbatim.
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Directory holding comparison artifacts (default: outputs/).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// The two recordings to compare (MP3, OGG, FLAC, WAV, ...).
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
    #[command(flatten)]
    pub store: StoreArgs,
    /// JSON file overriding analysis settings.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,
    /// Skip writing the artifact; only print the summary.
    #[arg(long = "no-save")]
    pub no_save: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Artifact file name as printed by `list`.
    #[arg(value_name = "NAME")]
    pub name: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn parses_compare_with_options() {
        let cli = Cli::try_parse_from([
            "aura",
            "compare",
            "a.wav",
            "b.wav",
            "--output-dir",
            "out",
            "--settings",
            "tuning.json",
            "--no-save",
        ])
        .unwrap();
        match cli.command {
            Command::Compare(args) => {
                assert_eq!(args.files, vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")]);
                assert_eq!(args.store.output_dir, Some(PathBuf::from("out")));
                assert_eq!(args.settings, Some(PathBuf::from("tuning.json")));
                assert!(args.no_save);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn compare_requires_files() {
        assert!(Cli::try_parse_from(["aura", "compare"]).is_err());
    }

    #[test]
    fn compare_accepts_any_count_for_later_validation() {
        let cli = Cli::try_parse_from(["aura", "compare", "only.wav"]).unwrap();
        assert!(matches!(cli.command, Command::Compare(ref args) if args.files.len() == 1));
    }

    #[test]
    fn parses_list_and_show() {
        let cli = Cli::try_parse_from(["aura", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List(ref args) if args.output_dir.is_none()));

        let cli = Cli::try_parse_from(["aura", "show", "audio_analysis_a_vs_b.json"]).unwrap();
        match cli.command {
            Command::Show(args) => assert_eq!(args.name, "audio_analysis_a_vs_b.json"),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["aura", "show"]).is_err());
    }
}
