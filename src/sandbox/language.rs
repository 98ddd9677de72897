use std::path::Path;

/// Static profile describing how to materialize and launch one language.
///
/// The table below is the only source of truth for the supported set; lookups
/// are case-insensitive and unknown names are rejected before anything
/// touches the filesystem.
pub struct LanguageProfile {
    /// Canonical language name (lowercase).
    pub name: &'static str,
    /// Accepted shorthand spellings besides `name`.
    aliases: &'static [&'static str],
    /// Source file extension, including the leading dot.
    pub extension: &'static str,
    /// Fixed file name for runtimes that mandate one (e.g. Java class files).
    canonical_file_name: Option<&'static str>,
    build_command: fn(&Path) -> Vec<String>,
}

static LANGUAGES: &[LanguageProfile] = &[
    LanguageProfile {
        name: "python",
        aliases: &[],
        extension: ".py",
        canonical_file_name: Some("snippet.py"),
        build_command: python_command,
    },
    LanguageProfile {
        name: "javascript",
        aliases: &["js"],
        extension: ".js",
        canonical_file_name: Some("snippet.js"),
        build_command: javascript_command,
    },
    LanguageProfile {
        name: "typescript",
        aliases: &["ts"],
        extension: ".ts",
        canonical_file_name: Some("snippet.ts"),
        build_command: typescript_command,
    },
    LanguageProfile {
        name: "java",
        aliases: &[],
        extension: ".java",
        // The runtime requires the file name to match the public class.
        canonical_file_name: Some("Solution.java"),
        build_command: java_command,
    },
    LanguageProfile {
        name: "go",
        aliases: &[],
        extension: ".go",
        canonical_file_name: Some("snippet.go"),
        build_command: go_command,
    },
];

impl LanguageProfile {
    /// Looks up a profile by case-insensitive name or alias.
    pub fn find(name: &str) -> Option<&'static LanguageProfile> {
        let normalized = name.trim().to_lowercase();
        LANGUAGES
            .iter()
            .find(|p| p.name == normalized || p.aliases.contains(&normalized.as_str()))
    }

    /// File name the snippet is written under inside the execution directory.
    pub fn source_file_name(&self) -> String {
        match self.canonical_file_name {
            Some(name) => name.to_string(),
            None => format!("snippet{}", self.extension),
        }
    }

    /// Builds the launch argv for a source file at the given absolute path.
    ///
    /// Interpreted languages run directly; compiled or transpiled languages
    /// are expressed as a single compile-then-run shell pipeline so the
    /// supervisor sees one uniform child process either way.
    pub fn command(&self, source_path: &Path) -> Vec<String> {
        (self.build_command)(source_path)
    }
}

/// All accepted language identifiers, canonical names and aliases alike.
pub fn supported_languages() -> Vec<&'static str> {
    let mut names = Vec::new();
    for profile in LANGUAGES {
        names.push(profile.name);
        names.extend_from_slice(profile.aliases);
    }
    names
}

fn python_command(source_path: &Path) -> Vec<String> {
    vec![
        "python3".to_string(),
        source_path.to_string_lossy().into_owned(),
    ]
}

fn javascript_command(source_path: &Path) -> Vec<String> {
    vec!["node".to_string(), source_path.to_string_lossy().into_owned()]
}

fn go_command(source_path: &Path) -> Vec<String> {
    vec![
        "go".to_string(),
        "run".to_string(),
        source_path.to_string_lossy().into_owned(),
    ]
}

fn java_command(source_path: &Path) -> Vec<String> {
    let file_name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let class_name = source_path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Runs with cwd set to the execution directory, so bare names resolve.
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("javac {file_name} && java {class_name}"),
    ]
}

fn typescript_command(source_path: &Path) -> Vec<String> {
    let file_name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let js_name = source_path
        .file_stem()
        .map(|n| format!("{}.js", n.to_string_lossy()))
        .unwrap_or_default();

    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("tsc {file_name} && node {js_name}"),
    ]
}
