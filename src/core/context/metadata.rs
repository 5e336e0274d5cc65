//! Keyword tables shared by document ingestion and the keyword classifier.

use std::path::Path;

use serde_json::{Map, Value, json};

/// Filename/utterance keywords mapped to a project type, first match wins.
const PROJECT_TYPES: &[(&[&str], &str)] = &[
    (&["web", "website"], "web_development"),
    (&["mobile", "app"], "mobile_development"),
    (&["ai", "ml", "machine-learning", "machine learning"], "ai_ml"),
    (&["api", "backend"], "backend_development"),
    (&["consulting", "strategy"], "consulting"),
];

/// Filename/utterance keywords mapped to a service type, first match wins.
const SERVICE_TYPES: &[(&[&str], &str)] = &[
    (&["development", "dev"], "development"),
    (&["design", "ui", "ux"], "design"),
    (&["consulting", "advisory"], "consulting"),
    (&["maintenance", "support"], "maintenance"),
    (&["testing", "qa"], "testing"),
];

const TECHNOLOGIES: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue.js"),
    ("angular", "Angular"),
    ("node", "Node.js"),
    ("python", "Python"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("php", "PHP"),
    ("laravel", "Laravel"),
    ("wordpress", "WordPress"),
    ("shopify", "Shopify"),
    ("aws", "AWS"),
    ("azure", "Azure"),
    ("gcp", "Google Cloud"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("mongodb", "MongoDB"),
    ("postgresql", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("redis", "Redis"),
    ("tensorflow", "TensorFlow"),
    ("pytorch", "PyTorch"),
    ("scikit-learn", "Scikit-learn"),
    ("nextjs", "Next.js"),
    ("nuxt", "Nuxt.js"),
    ("svelte", "Svelte"),
    ("flutter", "Flutter"),
    ("react native", "React Native"),
    ("swift", "Swift"),
    ("kotlin", "Kotlin"),
    ("java", "Java"),
    ("c#", "C#"),
    (".net", ".NET"),
    ("go", "Go"),
    ("rust", "Rust"),
    ("graphql", "GraphQL"),
    ("rest api", "REST API"),
    ("microservices", "Microservices"),
    ("serverless", "Serverless"),
    ("blockchain", "Blockchain"),
    ("ethereum", "Ethereum"),
    ("solidity", "Solidity"),
];

/// Lowercased text reduced to space-separated tokens, padded with a space on
/// both sides so lookups only match whole tokens. Hyphens separate tokens,
/// so `machine-learning` and `machine learning` are the same phrase.
pub(crate) fn token_text(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '#' | '+' | '.') {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = mapped
        .split_whitespace()
        .map(|t| t.trim_end_matches('.'))
        .filter(|t| !t.is_empty())
        .collect();

    format!(" {} ", tokens.join(" "))
}

fn has_keyword(tokens: &str, keyword: &str) -> bool {
    tokens.contains(&token_text(keyword))
}

fn first_match(tokens: &str, table: &[(&[&str], &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| has_keyword(tokens, k)))
        .map(|(_, value)| *value)
}

pub(crate) fn infer_project_type(tokens: &str) -> Option<&'static str> {
    first_match(tokens, PROJECT_TYPES)
}

pub(crate) fn infer_service_type(tokens: &str) -> Option<&'static str> {
    first_match(tokens, SERVICE_TYPES)
}

/// Display names of the technologies mentioned, in table order, without duplicates.
pub(crate) fn detect_technologies(tokens: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (keyword, name) in TECHNOLOGIES {
        if has_keyword(tokens, keyword) && !found.iter().any(|f| f == name) {
            found.push((*name).to_string());
        }
    }
    found
}

/// Build document metadata from the filename and content.
///
/// Values in `overrides` win over anything inferred.
pub fn extract_metadata(filename: &str, content: &str, overrides: &Map<String, Value>) -> Value {
    let mut metadata = Map::new();

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let name_tokens = token_text(stem);
    if let Some(project) = infer_project_type(&name_tokens) {
        metadata.insert("project_type".into(), json!(project));
    }
    if let Some(service) = infer_service_type(&name_tokens) {
        metadata.insert("service_type".into(), json!(service));
    }

    let technologies = detect_technologies(&token_text(content));
    if !technologies.is_empty() {
        metadata.insert("technologies".into(), json!(technologies));
    }

    metadata.insert("character_count".into(), json!(content.chars().count()));
    metadata.insert("word_count".into(), json!(content.split_whitespace().count()));
    metadata.insert("filename".into(), json!(filename));

    for (key, value) in overrides {
        metadata.insert(key.clone(), value.clone());
    }

    Value::Object(metadata)
}
