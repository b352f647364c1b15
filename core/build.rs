use std::collections::HashSet;
use std::env;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Deserialize)]
struct CatalogFile {
    default_slug: Option<String>,
    lists: Vec<WordListFile>,
}

#[derive(Deserialize)]
struct WordListFile {
    label: String,
    slug: String,
    title: Option<String>,
    words: Vec<String>,
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("missing CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir.parent().unwrap_or(&manifest_dir);
    let env_path = workspace_root.join(".env");
    let env_local_path = workspace_root.join(".env.local");

    let _ = dotenvy::from_filename(&env_local_path);
    let _ = dotenvy::from_filename(&env_path);

    println!("cargo:rerun-if-env-changed=WORD_CATALOG_PATH");
    println!("cargo:rerun-if-changed={}", env_path.display());
    println!("cargo:rerun-if-changed={}", env_local_path.display());

    let catalog_path = resolve_catalog_path(workspace_root);
    println!("cargo:rerun-if-changed={}", catalog_path.display());

    let contents = fs::read_to_string(&catalog_path).unwrap_or_else(|err| {
        panic!(
            "failed to read word catalog at {}: {err}",
            catalog_path.display()
        )
    });

    let catalog: CatalogFile = toml::from_str(&contents).unwrap_or_else(|err| {
        panic!(
            "failed to parse word catalog at {}: {err}",
            catalog_path.display()
        )
    });

    if catalog.lists.is_empty() {
        panic!("word catalog {} has no lists", catalog_path.display());
    }

    let lists: Vec<(WordListFile, Vec<String>)> = catalog
        .lists
        .into_iter()
        .map(|list| {
            let words = normalize_words(&list, &catalog_path);
            (list, words)
        })
        .collect();
    validate_slugs(&lists, &catalog_path);

    let default_slug = catalog
        .default_slug
        .as_deref()
        .unwrap_or(lists[0].0.slug.as_str());
    let default_index = lists
        .iter()
        .position(|(list, _)| list.slug == default_slug)
        .unwrap_or_else(|| {
            panic!(
                "default_slug '{}' not found in {}",
                default_slug,
                catalog_path.display()
            )
        });

    let mut output = String::new();
    writeln!(
        &mut output,
        "pub const DEFAULT_WORD_LIST_SLUG: &str = {};",
        rust_string(default_slug)
    )
    .unwrap();
    writeln!(
        &mut output,
        "pub const DEFAULT_WORD_LIST_INDEX: usize = {default_index};"
    )
    .unwrap();
    writeln!(&mut output).unwrap();
    writeln!(
        &mut output,
        "pub const WORD_LIST_CATALOG: &[WordListEntry] = &["
    )
    .unwrap();

    for (list, words) in &lists {
        let title = list
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(list.label.as_str());
        writeln!(&mut output, "    WordListEntry {{").unwrap();
        writeln!(&mut output, "        label: {},", rust_string(&list.label)).unwrap();
        writeln!(&mut output, "        slug: {},", rust_string(&list.slug)).unwrap();
        writeln!(&mut output, "        title: {},", rust_string(title)).unwrap();
        write!(&mut output, "        words: &[").unwrap();
        for word in words {
            write!(&mut output, "{}, ", rust_string(word)).unwrap();
        }
        writeln!(&mut output, "],").unwrap();
        writeln!(&mut output, "    }},").unwrap();
    }

    writeln!(&mut output, "];").unwrap();

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("missing OUT_DIR"));
    let out_path = out_dir.join("word_catalog.rs");
    fs::write(&out_path, output).unwrap_or_else(|err| {
        panic!("failed to write {}: {err}", out_path.display())
    });
}

fn resolve_catalog_path(workspace_root: &Path) -> PathBuf {
    let env_value = env::var("WORD_CATALOG_PATH").ok();
    let raw_path = match env_value {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => workspace_root.join("wordlists/catalog.toml"),
    };
    if raw_path.is_relative() {
        workspace_root.join(raw_path)
    } else {
        raw_path
    }
}

fn rust_string(value: &str) -> String {
    format!("{:?}", value)
}

fn normalize_words(list: &WordListFile, catalog_path: &Path) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut words = Vec::with_capacity(list.words.len());
    for raw in &list.words {
        let word = raw.trim().to_uppercase();
        if word.is_empty() {
            panic!(
                "word list '{}' has an empty word in {}",
                list.slug,
                catalog_path.display()
            );
        }
        if !word.chars().all(char::is_alphabetic) {
            panic!(
                "word list '{}' has non-letter word '{}' in {}",
                list.slug,
                raw,
                catalog_path.display()
            );
        }
        if !seen.insert(word.clone()) {
            panic!(
                "duplicate word '{}' in list '{}' in {}",
                word,
                list.slug,
                catalog_path.display()
            );
        }
        words.push(word);
    }
    if words.len() < 2 {
        panic!(
            "word list '{}' needs at least two words in {}",
            list.slug,
            catalog_path.display()
        );
    }
    words
}

fn validate_slugs(lists: &[(WordListFile, Vec<String>)], catalog_path: &Path) {
    let mut slugs = HashSet::new();
    for (list, _) in lists {
        if list.slug.trim().is_empty() {
            panic!("word list slug cannot be empty in {}", catalog_path.display());
        }
        if list.label.trim().is_empty() {
            panic!(
                "word list '{}' needs a label in {}",
                list.slug,
                catalog_path.display()
            );
        }
        if !slugs.insert(list.slug.clone()) {
            panic!(
                "duplicate word list slug '{}' in {}",
                list.slug,
                catalog_path.display()
            );
        }
    }
}
