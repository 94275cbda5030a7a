// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Input handling and the extract → anonymise pipeline.  Each input is read
//! either as one buffer (extraction) or line by line (log filtering); the
//! anonymiser, and with it the real → synthetic mapping, is shared by all of
//! them.

use crate::extract::{BodyScanner, ExtractOutcome, Extractor, Fragment, ScanEvent};
use crate::scrub::Anonymizer;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
/// Namespace filter was active and matched nothing.
pub const EXIT_NO_MATCHES: i32 = 3;

/// How inputs are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Buffer each input, extract envelopes, emit one fragment per match.
    Extract,
    /// Stream lines, pass non-SOAP lines through, rewrite Body blocks in place.
    Filter,
}

/// Shared context for a run to keep function signatures concise.
pub struct ScrubContext<'a> {
    pub out: &'a mut dyn Write,
    pub err_out: &'a mut dyn Write,
    /// `None` when only extracting.
    pub anonymizer: Option<&'a Anonymizer>,
    pub extractor: &'a mut Extractor,
    pub mode: RunMode,
    pub parallel: bool,
}

/// Process every input in order and return the process exit code.  `-` (or
/// no paths at all) means stdin.  A failing input is reported and skipped;
/// the rest are still processed.
pub fn scrub_files(paths: &[String], ctx: &mut ScrubContext) -> i32 {
    let mut had_error = false;

    if paths.is_empty() {
        had_error |= handle_stdin(ctx).is_err();
    }

    for path in paths {
        let res = if path == "-" {
            handle_stdin(ctx)
        } else {
            handle_file(path, ctx)
        };
        had_error |= res.is_err();
    }

    if let Err(err) = ctx.out.flush() {
        let _ = writeln!(ctx.err_out, "Error writing output: {err}");
        had_error = true;
    }

    if let Some(anonymizer) = ctx.anonymizer {
        tracing::info!(
            fragments = ctx.extractor.emitted(),
            substitutions = anonymizer.substitutions(),
            distinct_values = anonymizer.mapped_values(),
            "run complete"
        );
    }

    if had_error {
        return EXIT_ERROR;
    }
    if ctx.mode == RunMode::Extract && ctx.extractor.outcome() == ExtractOutcome::NoMatches {
        let namespace = ctx.extractor.options().namespace.as_deref().unwrap_or_default();
        let _ = writeln!(
            ctx.err_out,
            "No matching SOAP envelopes found for namespace {namespace}."
        );
        return EXIT_NO_MATCHES;
    }
    EXIT_OK
}

fn handle_stdin(ctx: &mut ScrubContext) -> io::Result<()> {
    let stdin = io::stdin();
    let res = process_reader(BufReader::new(stdin.lock()), ctx);
    if let Err(err) = &res {
        let _ = writeln!(ctx.err_out, "Error reading input: {err}");
    }
    res
}

fn handle_file(path: &str, ctx: &mut ScrubContext) -> io::Result<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            let _ = writeln!(ctx.err_out, "Cannot open file: {path}: {err}");
            tracing::warn!(path = %path, error = %err, "skipping input");
            return Err(err);
        }
    };
    let res = process_reader(BufReader::new(file), ctx);
    if let Err(err) = &res {
        let _ = writeln!(ctx.err_out, "Error reading {path}: {err}");
    }
    res
}

fn process_reader<R: BufRead>(mut reader: R, ctx: &mut ScrubContext) -> io::Result<()> {
    match ctx.mode {
        RunMode::Extract => {
            let mut raw = Vec::new();
            reader.read_to_end(&mut raw)?;
            extract_buffer(&String::from_utf8_lossy(&raw), ctx)
        }
        RunMode::Filter => anonymize_stream(reader, ctx),
    }
}

/// Extract every envelope from one buffered input and write the (optionally
/// anonymised) fragments, each behind its separator comment.
pub fn extract_buffer(text: &str, ctx: &mut ScrubContext) -> io::Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let fragments = ctx.extractor.extract(text);
    let rendered = render_fragments(&fragments, ctx.anonymizer, ctx.parallel);

    for (fragment, xml) in fragments.iter().zip(rendered) {
        writeln!(ctx.out)?;
        writeln!(ctx.out, "{}", fragment.separator())?;
        writeln!(ctx.out, "{xml}")?;
    }
    Ok(())
}

/// Anonymise fragments, keeping input order even when done in parallel.
fn render_fragments(
    fragments: &[Fragment],
    anonymizer: Option<&Anonymizer>,
    parallel: bool,
) -> Vec<String> {
    match anonymizer {
        Some(anonymizer) if parallel => fragments
            .par_iter()
            .map(|f| anonymizer.anonymize(&f.xml))
            .collect(),
        Some(anonymizer) => fragments.iter().map(|f| anonymizer.anonymize(&f.xml)).collect(),
        None => fragments.iter().map(|f| f.xml.clone()).collect(),
    }
}

/// Log-filter mode: copy lines through, rewriting each SOAP Body block as it
/// closes.  A block still open at end of input is rewritten and flushed so
/// nothing read is lost or left unredacted.
pub fn anonymize_stream<R: BufRead>(mut reader: R, ctx: &mut ScrubContext) -> io::Result<()> {
    let mut scanner = BodyScanner::new();
    let mut raw = Vec::new();

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        match scanner.feed(&line) {
            ScanEvent::Passthrough(text) => write!(ctx.out, "{text}")?,
            ScanEvent::Pending => {}
            ScanEvent::Block(block) => write_block(&block, ctx)?,
        }
    }

    if let Some(rest) = scanner.finish() {
        tracing::warn!("input ended inside a SOAP Body block");
        write_block(&rest, ctx)?;
    }
    Ok(())
}

fn write_block(block: &str, ctx: &mut ScrubContext) -> io::Result<()> {
    let text = match ctx.anonymizer {
        Some(anonymizer) => anonymizer.anonymize(block),
        None => block.to_string(),
    };
    write!(ctx.out, "{text}")?;
    if !text.ends_with('\n') {
        writeln!(ctx.out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeneratorError;
    use crate::extract::ExtractOptions;
    use crate::scrub::{Category, CategoryResolver, ValueGenerator};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Sequential {
        calls: AtomicUsize,
    }

    impl ValueGenerator for Sequential {
        fn generate(&self, category: Category) -> Result<String, GeneratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{category}{n:04}"))
        }
    }

    fn anonymizer() -> Anonymizer {
        Anonymizer::new(CategoryResolver::builtin(), Box::new(Sequential::default()))
    }

    fn envelope(first_name: &str) -> String {
        format!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><p:Customer xmlns:p="urn:crm"><p:FirstName>{first_name}</p:FirstName><p:Ref>9</p:Ref></p:Customer></soapenv:Body></soapenv:Envelope>"#
        )
    }

    fn run_extract(
        text: &str,
        options: ExtractOptions,
        anonymizer: Option<&Anonymizer>,
        parallel: bool,
    ) -> String {
        let mut out = Vec::new();
        let mut err = io::sink();
        let mut extractor = Extractor::new(options);
        let mut ctx = ScrubContext {
            out: &mut out,
            err_out: &mut err,
            anonymizer,
            extractor: &mut extractor,
            mode: RunMode::Extract,
            parallel,
        };
        extract_buffer(text, &mut ctx).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn same_real_value_gets_same_fake_across_envelopes() {
        let engine = anonymizer();
        let log = format!(
            "a {}\nb {}\n",
            envelope("Anna"),
            envelope("Anna")
        );
        let output = run_extract(&log, ExtractOptions::default(), Some(&engine), false);
        assert_eq!(output.matches("<p:FirstName>FirstName0001</p:FirstName>").count(), 2, "{output}");
        assert!(!output.contains("Anna"));
        assert!(output.contains("<p:Ref>9</p:Ref>"));
        assert!(output.contains("\n<!-- SOAP ENVELOPE #1 -->\n"));
        assert!(output.contains("\n<!-- SOAP ENVELOPE #2 -->\n"));
    }

    #[test]
    fn parallel_rendering_keeps_order_and_mapping() {
        let engine = anonymizer();
        let names = ["Anna", "Bernd", "Anna", "Clara", "Bernd", "Anna"];
        let log: String = names.iter().map(|n| format!("{}\n", envelope(n))).collect();
        let output = run_extract(&log, ExtractOptions::default(), Some(&engine), true);

        let separators: Vec<usize> = output
            .lines()
            .filter_map(|l| l.strip_prefix("<!-- SOAP ENVELOPE #"))
            .filter_map(|l| l.trim_end_matches(" -->").parse().ok())
            .collect();
        assert_eq!(separators, [1, 2, 3, 4, 5, 6]);

        let fakes: Vec<&str> = output
            .lines()
            .filter_map(|l| l.trim().strip_prefix("<p:FirstName>"))
            .filter_map(|l| l.strip_suffix("</p:FirstName>"))
            .collect();
        assert_eq!(fakes.len(), 6);
        assert_eq!(fakes[0], fakes[2]);
        assert_eq!(fakes[0], fakes[5]);
        assert_eq!(fakes[1], fakes[4]);
        assert_ne!(fakes[0], fakes[1]);
        assert_eq!(engine.mapped_values(), 3);
    }

    #[test]
    fn extract_only_leaves_values_alone() {
        let output = run_extract(&envelope("Anna"), ExtractOptions::default(), None, false);
        assert!(output.contains("<p:FirstName>Anna</p:FirstName>"));
    }

    #[test]
    fn filter_mode_rewrites_bodies_in_place() {
        let engine = anonymizer();
        let log = "INFO boot\n\
            DEBUG <soapenv:Body>\n\
            <ns:Nachname>Schmidt</ns:Nachname>\n\
            </soapenv:Body>\n\
            INFO Nachname=Schmidt stays\n\
            <soapenv:Body><ns:City>Bonn</ns:City>\n";
        let mut out = Vec::new();
        let mut err = io::sink();
        let mut extractor = Extractor::new(ExtractOptions::default());
        let mut ctx = ScrubContext {
            out: &mut out,
            err_out: &mut err,
            anonymizer: Some(&engine),
            extractor: &mut extractor,
            mode: RunMode::Filter,
            parallel: false,
        };
        anonymize_stream(Cursor::new(log), &mut ctx).unwrap();
        let output = String::from_utf8(out).unwrap();
        assert_eq!(
            output,
            "INFO boot\n\
             DEBUG <soapenv:Body>\n\
             <ns:Nachname>LastName0001</ns:Nachname>\n\
             </soapenv:Body>\n\
             INFO Nachname=Schmidt stays\n\
             <soapenv:Body><ns:City>City0002</ns:City>\n"
        );
    }

    #[test]
    fn no_matches_under_namespace_filter_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, envelope("Anna")).unwrap();

        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut extractor = Extractor::new(ExtractOptions {
            namespace: Some("http://other.org/ns".into()),
            ..Default::default()
        });
        let mut ctx = ScrubContext {
            out: &mut out,
            err_out: &mut err,
            anonymizer: None,
            extractor: &mut extractor,
            mode: RunMode::Extract,
            parallel: false,
        };
        let code = scrub_files(&[path.display().to_string()], &mut ctx);
        assert_eq!(code, EXIT_NO_MATCHES);
        assert!(out.is_empty());
        assert!(String::from_utf8(err).unwrap().contains("No matching SOAP envelopes"));
    }

    #[test]
    fn missing_file_is_an_error_but_others_still_run() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.log");
        std::fs::write(&good, envelope("Anna")).unwrap();
        let missing = dir.path().join("missing.log");

        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut extractor = Extractor::new(ExtractOptions::default());
        let mut ctx = ScrubContext {
            out: &mut out,
            err_out: &mut err,
            anonymizer: None,
            extractor: &mut extractor,
            mode: RunMode::Extract,
            parallel: false,
        };
        let paths = [missing.display().to_string(), good.display().to_string()];
        assert_eq!(scrub_files(&paths, &mut ctx), EXIT_ERROR);
        assert!(String::from_utf8(out).unwrap().contains("SOAP ENVELOPE #1"));
        assert!(String::from_utf8(err).unwrap().contains("Cannot open file"));
    }
}
