//! Terminal output and the interactive menu.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use faceguard_vision::EmbeddingProvider;

use crate::access::{self, Recognition};
use crate::enroll::{self, BulkReport, EnrollOutcome, OverwritePolicy};
use crate::matcher::Matcher;
use crate::storage::FaceStore;

const RULE: &str = "----------------------------------------------------------------------";

pub fn print_recognition(
    out: &mut impl Write,
    image: &Path,
    result: &Recognition,
    matcher: &Matcher,
) -> std::io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "Image:      {}", image.display())?;
    if let Recognition::Matched(m) = result {
        if let (Some(name), Some(d)) = (&m.best_match, m.distance) {
            writeln!(out, "Best match: {name}")?;
            writeln!(out, "Distance:   {d:.4}")?;
        }
        writeln!(out, "Threshold:  {}", matcher.threshold())?;
    }
    writeln!(out, "{RULE}")?;

    match result.denial_reason() {
        None => {
            writeln!(out, "ACCESS GRANTED")?;
            if let Recognition::Matched(m) = result {
                if let Some(name) = &m.best_match {
                    writeln!(out, "  Welcome, {name}!")?;
                }
            }
        }
        Some(reason) => {
            writeln!(out, "ACCESS DENIED")?;
            if let Recognition::Matched(m) = result {
                if let (Some(name), Some(d)) = (&m.best_match, m.distance) {
                    writeln!(out, "  Closest match: {name} (distance: {d:.4})")?;
                }
            }
            writeln!(out, "  Reason: {reason}")?;
        }
    }
    Ok(())
}

pub fn print_people(out: &mut impl Write, store: &FaceStore) -> std::io::Result<()> {
    writeln!(out, "Authorized personnel:")?;
    if store.is_empty() {
        writeln!(out, "  (empty)")?;
    }
    for (i, name) in store.identities().enumerate() {
        writeln!(out, "  {}. {name}", i + 1)?;
    }
    writeln!(out, "Total: {}", store.len())
}

pub fn print_enroll(
    out: &mut impl Write,
    identity: &str,
    outcome: &EnrollOutcome,
    store: &FaceStore,
) -> std::io::Result<()> {
    if outcome.is_success() {
        writeln!(out, "Successfully {outcome} '{identity}'")?;
        writeln!(out, "  Total authorized personnel: {}", store.len())
    } else {
        writeln!(out, "Failed to add '{identity}': {outcome}")
    }
}

pub fn print_bulk(out: &mut impl Write, report: &BulkReport) -> std::io::Result<()> {
    for entry in &report.entries {
        let file = entry.image.file_name().unwrap_or_default().to_string_lossy();
        match &entry.outcome {
            Ok(o) if o.is_success() => writeln!(out, "  ok    {} ({file})", entry.identity)?,
            Ok(o) => writeln!(out, "  fail  {} ({file}): {o}", entry.identity)?,
            Err(e) => writeln!(out, "  fail  {} ({file}): {e}", entry.identity)?,
        }
    }
    writeln!(out, "Added: {}/{} people", report.succeeded(), report.total())
}

/// Prompt and read one trimmed line. `None` at end of input.
fn prompt(input: &mut impl BufRead, out: &mut impl Write, text: &str) -> Result<Option<String>> {
    write!(out, "{text}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

enum ImageAnswer {
    Found(PathBuf),
    Missing,
    EndOfInput,
}

fn prompt_image(input: &mut impl BufRead, out: &mut impl Write) -> Result<ImageAnswer> {
    let Some(path) = prompt(input, out, "Enter path to face image: ")? else {
        return Ok(ImageAnswer::EndOfInput);
    };
    let path = PathBuf::from(path);
    if !path.exists() {
        writeln!(out, "Error: file not found: {}", path.display())?;
        return Ok(ImageAnswer::Missing);
    }
    Ok(ImageAnswer::Found(path))
}

/// Interactive loop: recognize, add, list, exit. Returns at choice 4 or
/// end of input.
pub fn run_menu<R, W, P>(
    input: &mut R,
    out: &mut W,
    store: &mut FaceStore,
    provider: &mut P,
    matcher: &Matcher,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    P: EmbeddingProvider + ?Sized,
{
    writeln!(out, "FACE RECOGNITION ACCESS CONTROL")?;

    loop {
        writeln!(out, "{RULE}")?;
        writeln!(out, "  1. Recognize face (check access)")?;
        writeln!(out, "  2. Add new person")?;
        writeln!(out, "  3. List all people")?;
        writeln!(out, "  4. Exit")?;
        writeln!(out, "{RULE}")?;

        let Some(choice) = prompt(input, out, "Enter choice (1-4): ")? else {
            break;
        };

        match choice.as_str() {
            "1" => {
                let image = match prompt_image(input, out)? {
                    ImageAnswer::Found(image) => image,
                    ImageAnswer::Missing => continue,
                    ImageAnswer::EndOfInput => break,
                };
                match access::recognize(provider, store, matcher, &image) {
                    Ok(result) => print_recognition(out, &image, &result, matcher)?,
                    Err(e) => writeln!(out, "Recognition failed: {e}")?,
                }
            }
            "2" => {
                let Some(name) = prompt(input, out, "Enter person's name: ")? else {
                    break;
                };
                if name.is_empty() {
                    writeln!(out, "Error: name cannot be empty")?;
                    continue;
                }
                let image = match prompt_image(input, out)? {
                    ImageAnswer::Found(image) => image,
                    ImageAnswer::Missing => continue,
                    ImageAnswer::EndOfInput => break,
                };

                let mut confirm = |identity: &str| {
                    let question = format!("'{identity}' already exists. Overwrite? (y/n): ");
                    matches!(
                        prompt(&mut *input, &mut *out, &question),
                        Ok(Some(answer)) if answer.eq_ignore_ascii_case("y")
                    )
                };
                let outcome = enroll::add_person(
                    store,
                    provider,
                    &name,
                    &image,
                    OverwritePolicy::Ask(&mut confirm),
                );
                match outcome {
                    Ok(outcome) => print_enroll(out, &name, &outcome, store)?,
                    Err(e) => writeln!(out, "Failed to add '{name}': {e}")?,
                }
            }
            "3" => print_people(out, store)?,
            "4" => break,
            _ => writeln!(out, "Invalid choice. Please enter 1-4.")?,
        }
    }

    writeln!(out, "Goodbye!")?;
    Ok(())
}
