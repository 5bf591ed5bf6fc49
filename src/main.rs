use std::fs;
use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use uilex::exports::{AGGREGATE_FILE, GROUPED_FILE, UNTRANSLATED_FILE};
use uilex::{DictionaryStore, Session, SessionConfig, canonicalize, make_shape, reify};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("uilex")
        .version("0.1.0")
        .about("Translation lookup and collection for UI strings")
        .arg(
            Arg::new("root")
                .long("root")
                .short('r')
                .help("Root directory holding Dict/ and Export/")
                .default_value("."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Show debug-level log output")
                .action(ArgAction::SetTrue),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("rebuild")
                .about("Regenerate the _All listings from the per-context exports"),
        )
        .subcommand(
            Command::new("template")
                .about("Write the fill-in dictionary template from the untranslated listing"),
        )
        .subcommand(
            Command::new("reindex").about("Rebuild the provenance index from the export tree"),
        )
        .subcommand(Command::new("stats").about("Show dictionary and export tree counts"))
        .subcommand(
            Command::new("lookup")
                .about("Resolve one string against the dictionary, without collecting")
                .arg(
                    Arg::new("text")
                        .help("The string to resolve")
                        .required(true)
                        .index(1),
                ),
        )
        .get_matches();

    let default_filter = if matches.get_flag("verbose") {
        "uilex=debug"
    } else {
        "uilex=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let root = PathBuf::from(matches.get_one::<String>("root").unwrap());
    let config = SessionConfig::for_root(&root);

    match matches.subcommand() {
        Some(("rebuild", _)) => {
            let session = Session::new(config.clone())?;
            let summary = session.rebuild()?;
            println!("✅ Listings rebuilt under {}", config.all_dir().display());
            println!(
                "   {} collected, {} untranslated, {} contexts",
                summary.aggregate_lines, summary.untranslated_lines, summary.context_sections
            );
        }
        Some(("template", _)) => {
            let session = Session::new(config)?;
            let (path, rows) = session.write_template()?;
            println!("✅ Template with {} rows written to {}", rows, path.display());
        }
        Some(("reindex", _)) => {
            let session = Session::new(config)?;
            let (entries, contexts) = session.rebuild_provenance()?;
            println!(
                "✅ Provenance index rebuilt: {} shapes across {} contexts",
                entries, contexts
            );
        }
        Some(("stats", _)) => {
            let session = Session::new(config.clone())?;
            println!(
                "📚 Dictionary: {} entries ({})",
                session.dictionary_len(),
                config.dictionary_path.display()
            );
            println!("🧾 Provenance: {} shapes", session.provenance_len());
            let all = config.all_dir();
            for (label, file) in [
                ("Aggregate", AGGREGATE_FILE),
                ("Untranslated", UNTRANSLATED_FILE),
                ("Grouped", GROUPED_FILE),
            ] {
                match count_data_lines(&all.join(file)) {
                    Some(count) => println!("   {}: {} lines", label, count),
                    None => println!("   {}: not rebuilt yet", label),
                }
            }
        }
        Some(("lookup", sub)) => {
            let text = sub.get_one::<String>("text").unwrap();
            let dict = DictionaryStore::new();
            dict.load_from(&config.dictionary_path);
            let key = canonicalize(text);
            match dict.resolve(&key) {
                Some(translation) => println!("✅ {}", reify(&translation)),
                None => {
                    println!("❌ No translation ({} entries loaded)", dict.len());
                    println!("   key:   {}", key);
                    println!("   shape: {}", make_shape(&key).shape);
                }
            }
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}

fn count_data_lines(path: &Path) -> Option<usize> {
    let content = fs::read_to_string(path).ok()?;
    Some(
        content
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
            .count(),
    )
}
