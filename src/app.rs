//! Non-interactive commands. Each returns whether it succeeded, which the
//! binary maps to the process exit code.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use faceguard_vision::EmbeddingProvider;
use log::{info, warn};

use crate::access;
use crate::config::Config;
use crate::console;
use crate::enroll::{self, OverwritePolicy};
use crate::matcher::Matcher;
use crate::storage::FaceStore;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether the face in an image is authorized (exit 0 if granted)
    Recognize { image: PathBuf },
    /// Enroll a person from an image
    Add {
        name: String,
        image: PathBuf,
        /// Overwrite an existing entry without asking
        #[arg(short, long)]
        force: bool,
    },
    /// List enrolled people
    List,
    /// Enroll every image in a directory, named after the file
    Setup {
        /// Directory to scan (defaults to images_dir from the config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Asked before replacing an existing identity. `None` means nobody can
/// answer, so existing entries are kept unless `--force` is given.
pub type Confirm<'a> = Option<&'a mut dyn FnMut(&str) -> bool>;

pub fn execute<P, W>(
    command: Command,
    cfg: &Config,
    store: &mut FaceStore,
    provider: &mut P,
    out: &mut W,
    confirm: Confirm<'_>,
) -> Result<bool>
where
    P: EmbeddingProvider + ?Sized,
    W: Write,
{
    match command {
        Command::Recognize { image } => {
            recognize(store, provider, &Matcher::new(cfg.threshold), &image, out)
        }
        Command::Add { name, image, force } => {
            add(store, provider, name.trim(), &image, force, confirm, out)
        }
        Command::List => {
            console::print_people(out, store)?;
            Ok(true)
        }
        Command::Setup { dir } => {
            let dir = dir.unwrap_or_else(|| cfg.images_dir.clone());
            setup(store, provider, &dir, out)
        }
    }
}

fn recognize<P, W>(
    store: &FaceStore,
    provider: &mut P,
    matcher: &Matcher,
    image: &Path,
    out: &mut W,
) -> Result<bool>
where
    P: EmbeddingProvider + ?Sized,
    W: Write,
{
    if !image.exists() {
        anyhow::bail!("File not found: {}", image.display());
    }
    let result = access::recognize(provider, store, matcher, image)?;
    console::print_recognition(out, image, &result, matcher)?;
    Ok(result.access_granted())
}

fn add<P, W>(
    store: &mut FaceStore,
    provider: &mut P,
    name: &str,
    image: &Path,
    force: bool,
    confirm: Confirm<'_>,
    out: &mut W,
) -> Result<bool>
where
    P: EmbeddingProvider + ?Sized,
    W: Write,
{
    if name.is_empty() {
        anyhow::bail!("Name cannot be empty");
    }
    if !image.exists() {
        anyhow::bail!("File not found: {}", image.display());
    }

    let policy = match confirm {
        _ if force => OverwritePolicy::Always,
        Some(ask) => OverwritePolicy::Ask(ask),
        None => {
            if store.contains(name) {
                warn!("'{name}' exists; pass --force to overwrite");
            }
            OverwritePolicy::Never
        }
    };

    info!("Adding {name} from {}", image.display());
    let outcome = enroll::add_person(store, provider, name, image, policy)
        .context("Failed to save face record")?;
    console::print_enroll(out, name, &outcome, store)?;
    Ok(outcome.is_success())
}

fn setup<P, W>(store: &mut FaceStore, provider: &mut P, dir: &Path, out: &mut W) -> Result<bool>
where
    P: EmbeddingProvider + ?Sized,
    W: Write,
{
    info!("Scanning {} for face images", dir.display());
    let report = enroll::enroll_directory(store, provider, dir)?;
    if report.total() == 0 {
        writeln!(out, "No images found in {}", dir.display())?;
        return Ok(false);
    }
    console::print_bulk(out, &report)?;
    console::print_people(out, store)?;
    Ok(report.succeeded() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use faceguard_vision::Embedding;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        cfg: Config,
        store: FaceStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cfg = Config {
                database: dir.path().join("faces.json"),
                images_dir: dir.path().join("images"),
                threshold: 1.0,
                ..Config::default()
            };
            let store = FaceStore::empty(&cfg.database);
            Fixture { dir, cfg, store }
        }

        fn image(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"").unwrap();
            path
        }

        fn run(
            &mut self,
            command: Command,
            provider: &mut ScriptedProvider,
            confirm: Confirm<'_>,
        ) -> Result<(bool, String)> {
            let mut out = Vec::new();
            let ok = execute(command, &self.cfg, &mut self.store, provider, &mut out, confirm)?;
            Ok((ok, String::from_utf8(out).unwrap()))
        }
    }

    #[test]
    fn recognize_exit_status_follows_decision() {
        let mut fx = Fixture::new();
        fx.store
            .insert_or_replace("alice", Embedding::new(vec![0.0, 0.0]))
            .unwrap();
        let near = fx.image("near.png");
        let far = fx.image("far.png");
        let mut provider = ScriptedProvider::default()
            .face(&near, &[0.5, 0.0])
            .face(&far, &[3.0, 4.0]);

        let (ok, text) = fx
            .run(Command::Recognize { image: near }, &mut provider, None)
            .unwrap();
        assert!(ok);
        assert!(text.contains("ACCESS GRANTED"));

        let (ok, text) = fx
            .run(Command::Recognize { image: far }, &mut provider, None)
            .unwrap();
        assert!(!ok);
        assert!(text.contains("ACCESS DENIED"));
    }

    #[test]
    fn recognize_against_empty_database_fails() {
        let mut fx = Fixture::new();
        let image = fx.image("q.png");
        let mut provider = ScriptedProvider::default().face(&image, &[0.0]);
        let (ok, _) = fx
            .run(Command::Recognize { image }, &mut provider, None)
            .unwrap();
        assert!(!ok);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn recognize_missing_file_is_an_error() {
        let mut fx = Fixture::new();
        let image = fx.dir.path().join("absent.png");
        let mut provider = ScriptedProvider::default();
        assert!(fx
            .run(Command::Recognize { image }, &mut provider, None)
            .is_err());
    }

    #[test]
    fn add_exit_status_follows_outcome() {
        let mut fx = Fixture::new();
        let good = fx.image("alice.png");
        let blank = fx.image("blank.png");
        let mut provider = ScriptedProvider::default()
            .face(&good, &[0.1, 0.2])
            .no_face(&blank);

        let add = |name: &str, image: &Path, force| Command::Add {
            name: name.to_string(),
            image: image.to_path_buf(),
            force,
        };

        let (ok, text) = fx.run(add(" alice ", &good, false), &mut provider, None).unwrap();
        assert!(ok);
        assert!(text.contains("Successfully added 'alice'"));

        let (ok, _) = fx.run(add("bob", &blank, false), &mut provider, None).unwrap();
        assert!(!ok);

        // nobody to ask and no --force: the entry is kept
        let (ok, _) = fx.run(add("alice", &good, false), &mut provider, None).unwrap();
        assert!(!ok);

        let (ok, text) = fx.run(add("alice", &good, true), &mut provider, None).unwrap();
        assert!(ok);
        assert!(text.contains("Successfully replaced 'alice'"));

        let mut declined = Vec::new();
        let mut ask = |identity: &str| {
            declined.push(identity.to_string());
            false
        };
        let (ok, _) = fx
            .run(add("alice", &good, false), &mut provider, Some(&mut ask))
            .unwrap();
        assert!(!ok);
        assert_eq!(declined, ["alice"]);

        assert!(fx.run(add("  ", &good, false), &mut provider, None).is_err());
    }

    #[test]
    fn list_always_succeeds() {
        let mut fx = Fixture::new();
        let (ok, text) = fx
            .run(Command::List, &mut ScriptedProvider::default(), None)
            .unwrap();
        assert!(ok);
        assert!(text.contains("(empty)"));
    }

    #[test]
    fn setup_exit_status_follows_enrollment() {
        let mut fx = Fixture::new();
        let images = fx.cfg.images_dir.clone();
        std::fs::create_dir_all(&images).unwrap();

        let (ok, text) = fx
            .run(Command::Setup { dir: None }, &mut ScriptedProvider::default(), None)
            .unwrap();
        assert!(!ok);
        assert!(text.contains("No images found"));

        std::fs::write(images.join("carol.png"), b"").unwrap();
        let mut provider = ScriptedProvider::default().no_face(images.join("carol.png"));
        let (ok, _) = fx
            .run(Command::Setup { dir: None }, &mut provider, None)
            .unwrap();
        assert!(!ok);

        std::fs::write(images.join("dave.png"), b"").unwrap();
        let mut provider = ScriptedProvider::default()
            .no_face(images.join("carol.png"))
            .face(images.join("dave.png"), &[1.0, 0.0]);
        let (ok, text) = fx
            .run(Command::Setup { dir: Some(images) }, &mut provider, None)
            .unwrap();
        assert!(ok);
        assert!(text.contains("Added: 1/2 people"));
        assert!(fx.store.contains("dave"));
    }
}
