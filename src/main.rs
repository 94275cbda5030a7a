// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

/// soapscrub command-line entry point and CLI orchestration.
///
/// The binary pulls SOAP envelopes out of application logs and swaps the
/// personal data inside them for consistent fakes.  This file is
/// intentionally light on XML logic; it wires user input into the focused
/// modules under `src/extract` and `src/scrub` and hands the result to
/// `pipeline`.
mod error;
mod extract;
mod pipeline;
mod scrub;

use anyhow::{Context, Result, anyhow};
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};
use extract::{ExtractOptions, Extractor, NamespaceMatch, SOAP11_NAMESPACE};
use pipeline::{EXIT_OK, RunMode, ScrubContext, scrub_files};
use scrub::AnonymizeMode;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Build-time version information.  CI bakes in the most recent tag via
/// `SOAPSCRUB_VERSION`; otherwise we fall back to Cargo's package version.
const VERSION: &str = match option_env!("SOAPSCRUB_VERSION") {
    Some(tag) => tag,
    None => env!("CARGO_PKG_VERSION"),
};

/// Environment variable holding the log filter (`debug`, `soapscrub=trace`, ...).
const LOG_ENV: &str = "SOAPSCRUB_LOG";

/// Git branch the binary was built from, `main` when not injected.
fn branch() -> &'static str {
    option_env!("SOAPSCRUB_BRANCH").unwrap_or("main")
}

/// Short Git commit baked in by `build.rs`, or a recognisable placeholder.
fn sha() -> &'static str {
    option_env!("SOAPSCRUB_COMMIT").unwrap_or("0000000")
}

/// Determine the rustc version baked in at build time.
fn rust_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Human-friendly version banner including branch and commit.
fn version_string() -> String {
    format!(
        "soapscrub {VERSION} (branch:{}, commit:{}) [rust:{}]",
        branch(),
        sha(),
        rust_version()
    )
}

/// Cached version string with a 'static lifetime for clap metadata.
fn version_str() -> &'static str {
    static VERSION_STR: OnceLock<String> = OnceLock::new();
    VERSION_STR.get_or_init(version_string).as_str()
}

/// Conventional `main` that defers to `run` so tests can call the logic
/// without having to spin up a separate process.
fn main() {
    std::process::exit(match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            1
        }
    });
}

/// Parse CLI arguments, build the engines and drive the pipeline.  Stdout
/// carries nothing but XML (or the filtered log), so banners and diagnostics
/// go to stderr.
fn run() -> Result<i32> {
    let cmd = build_cli();
    let matches = match cmd.try_get_matches() {
        Ok(m) => m,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                if err.kind() == ErrorKind::DisplayHelp {
                    print_usage();
                }
                return Ok(EXIT_OK);
            }
            _ => err.exit(),
        },
    };

    let opts = CliOptions::from_matches(&matches)?;

    if opts.show_version {
        println!("{}", version_string());
        return Ok(EXIT_OK);
    }

    init_logging(opts.verbose);

    let anonymizer = if opts.extract_only {
        None
    } else {
        Some(scrub::create_anonymizer(
            &opts.synonym_paths,
            opts.seed,
            opts.anonymize_mode,
        )?)
    };

    let mut out: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {path}"))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut stderr = io::stderr();

    let mut extractor = Extractor::new(opts.extract_options());
    let mut ctx = ScrubContext {
        out: &mut *out,
        err_out: &mut stderr,
        anonymizer: anonymizer.as_ref(),
        extractor: &mut extractor,
        mode: opts.mode,
        parallel: opts.render_in_parallel(),
    };

    let files = if opts.files.is_empty() {
        vec!["-".to_string()]
    } else {
        opts.files.clone()
    };
    Ok(scrub_files(&files, &mut ctx))
}

/// Install the stderr subscriber.  `SOAPSCRUB_LOG` wins; otherwise warnings
/// only, or debug with `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Construct the `clap` command with all supported arguments.  Options are
/// grouped roughly by feature area (selection, anonymisation, IO).
fn build_cli() -> Command {
    let cmd = Command::new("soapscrub")
        .about("Extract SOAP envelopes from logs and anonymise personal data inside them")
        .disable_version_flag(true)
        .version(version_str())
        .arg(
            Arg::new("namespace")
                .short('n')
                .long("namespace")
                .value_name("NS")
                .help("Only keep envelopes containing this namespace (omit to keep all)"),
        )
        .arg(
            Arg::new("soap-namespace")
                .short('s')
                .long("soap-namespace")
                .value_name("URI")
                .default_value(SOAP11_NAMESPACE)
                .help("SOAP envelope namespace used to find the Body"),
        )
        .arg(
            Arg::new("body-only")
                .short('b')
                .long("body-only")
                .action(ArgAction::SetTrue)
                .help("Emit only the SOAP Body content instead of the full envelope"),
        )
        .arg(
            Arg::new("synonyms")
                .long("synonyms")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Extra tag synonym table in XML (repeatable)"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .help("Seed the fake value generator for reproducible output"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write to FILE instead of stdout"),
        );

    add_flag_args(
        cmd,
        &[
            (
                "strict-namespace",
                "Match --namespace against parsed namespace bindings, not raw text",
            ),
            ("extract-only", "Extract envelopes without anonymising them"),
            (
                "filter",
                "Stream the log through, anonymising SOAP Body blocks in place",
            ),
            (
                "text-mode",
                "Anonymise with tag patterns only, never parse the XML",
            ),
            ("parallel", "Anonymise extracted fragments on all cores"),
            ("version", "Print version information and exit"),
        ],
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::SetTrue)
            .help("Log debug diagnostics to stderr"),
    )
    .arg(
        Arg::new("files")
            .value_name("FILE")
            .num_args(0..)
            .action(ArgAction::Append)
            .trailing_var_arg(true),
    )
}

/// Add a set of boolean flag arguments that simply flip a boolean when present.
fn add_flag_args(cmd: Command, flags: &[(&'static str, &'static str)]) -> Command {
    let mut out = cmd;
    for (name, help) in flags {
        out = out.arg(
            Arg::new(*name)
                .long(*name)
                .action(ArgAction::SetTrue)
                .help(*help),
        );
    }
    out
}

/// Structured view of the CLI flags so downstream code gets type-safe access
/// to user intent.
struct CliOptions {
    namespace: Option<String>,
    strict_namespace: bool,
    soap_namespace: String,
    body_only: bool,
    extract_only: bool,
    mode: RunMode,
    anonymize_mode: AnonymizeMode,
    synonym_paths: Vec<String>,
    seed: Option<u64>,
    parallel: bool,
    output: Option<String>,
    verbose: bool,
    show_version: bool,
    files: Vec<String>,
}

impl CliOptions {
    /// Translate clap's `ArgMatches` into our strongly typed `CliOptions`,
    /// rejecting combinations that make no sense before any input is read.
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let filter = matches.get_flag("filter");
        let namespace = matches.get_one::<String>("namespace").cloned();
        let body_only = matches.get_flag("body-only");
        let extract_only = matches.get_flag("extract-only");

        if filter && (namespace.is_some() || body_only || extract_only) {
            print_usage();
            return Err(anyhow!(
                "--filter cannot be combined with --namespace, --body-only or --extract-only"
            ));
        }
        if let Some(ns) = &namespace
            && ns.trim().is_empty()
        {
            print_usage();
            return Err(anyhow!("Invalid value for --namespace"));
        }

        let strings = |name: &str| -> Vec<String> {
            matches
                .get_many::<String>(name)
                .map(|vals| vals.map(|v| v.to_string()).collect())
                .unwrap_or_default()
        };

        Ok(Self {
            namespace,
            strict_namespace: matches.get_flag("strict-namespace"),
            soap_namespace: matches
                .get_one::<String>("soap-namespace")
                .cloned()
                .unwrap_or_else(|| SOAP11_NAMESPACE.to_string()),
            body_only,
            extract_only,
            mode: if filter {
                RunMode::Filter
            } else {
                RunMode::Extract
            },
            anonymize_mode: if matches.get_flag("text-mode") {
                AnonymizeMode::Text
            } else {
                AnonymizeMode::Tree
            },
            synonym_paths: strings("synonyms"),
            seed: parse_seed(matches.get_one::<String>("seed"))?,
            parallel: matches.get_flag("parallel"),
            output: matches.get_one::<String>("output").cloned(),
            verbose: matches.get_flag("verbose"),
            show_version: matches.get_flag("version"),
            files: strings("files"),
        })
    }

    /// Seeded runs draw fakes in fragment order, which worker threads would
    /// shuffle, so `--seed` wins over `--parallel`.
    fn render_in_parallel(&self) -> bool {
        if self.parallel && self.seed.is_some() {
            tracing::warn!("--seed given, rendering fragments sequentially");
            return false;
        }
        self.parallel
    }

    fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            namespace: self.namespace.clone(),
            namespace_match: if self.strict_namespace {
                NamespaceMatch::Structural
            } else {
                NamespaceMatch::Substring
            },
            body_only: self.body_only,
            soap_namespace: self.soap_namespace.clone(),
        }
    }
}

/// Parse `--seed`, accepting decimal or `0x` hex.
fn parse_seed(value: Option<&String>) -> Result<Option<u64>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed
        .map(Some)
        .map_err(|_| anyhow!("invalid value for --seed: {raw}"))
}

/// Print the condensed usage guide.  Kept in one function so we can reuse it
/// whenever argument parsing fails.
fn print_usage() {
    static USAGE: &str = include_str!("../resources/messages/usage_en.txt");
    eprintln!("\n{USAGE}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        let mut argv = vec!["soapscrub"];
        argv.extend_from_slice(args);
        let matches = build_cli().try_get_matches_from(argv)?;
        CliOptions::from_matches(&matches)
    }

    #[test]
    fn version_string_matches_components() {
        let expected = format!(
            "soapscrub {VERSION} (branch:{}, commit:{}) [rust:{}]",
            branch(),
            sha(),
            rust_version()
        );
        assert_eq!(version_string(), expected);
    }

    #[test]
    fn version_str_is_cached() {
        let first = version_str() as *const str;
        let second = version_str() as *const str;
        assert_eq!(first, second, "cached version string should be stable");
    }

    #[test]
    fn defaults_extract_and_anonymise_full_envelopes() {
        let opts = parse(&[]).unwrap();
        assert_eq!(opts.mode, RunMode::Extract);
        assert_eq!(opts.anonymize_mode, AnonymizeMode::Tree);
        assert!(!opts.extract_only);
        let extract = opts.extract_options();
        assert_eq!(extract.namespace, None);
        assert_eq!(extract.namespace_match, NamespaceMatch::Substring);
        assert_eq!(extract.soap_namespace, SOAP11_NAMESPACE);
        assert!(!extract.body_only);
    }

    #[test]
    fn selection_flags_reach_extract_options() {
        let opts = parse(&[
            "-n",
            "http://example.org/ns",
            "--strict-namespace",
            "-b",
            "app.log",
        ])
        .unwrap();
        let extract = opts.extract_options();
        assert_eq!(extract.namespace.as_deref(), Some("http://example.org/ns"));
        assert_eq!(extract.namespace_match, NamespaceMatch::Structural);
        assert!(extract.body_only);
        assert_eq!(opts.files, ["app.log"]);
    }

    #[test]
    fn filter_rejects_extraction_flags() {
        assert!(parse(&["--filter"]).is_ok());
        assert!(parse(&["--filter", "--body-only"]).is_err());
        assert!(parse(&["--filter", "-n", "urn:x"]).is_err());
    }

    #[test]
    fn seed_turns_parallel_rendering_off() {
        assert!(parse(&["--parallel"]).unwrap().render_in_parallel());
        assert!(!parse(&["--parallel", "--seed", "9"]).unwrap().render_in_parallel());
        assert!(!parse(&["--seed", "9"]).unwrap().render_in_parallel());
    }

    #[test]
    fn seed_accepts_decimal_and_hex() {
        assert_eq!(parse_seed(None).unwrap(), None);
        assert_eq!(parse_seed(Some(&"42".to_string())).unwrap(), Some(42));
        assert_eq!(parse_seed(Some(&"0x2a".to_string())).unwrap(), Some(42));
        assert!(parse_seed(Some(&"forty-two".to_string())).is_err());
    }
}
