use regex::Regex;
use tracing::debug;
use crate::error::{BqvError, Result};

/// Manifest kind holding an assertion query for the annotated view.
pub const TEST_MANIFEST: &str = "bqv:TEST";

/// One `[kind]` section of an annotation comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub kind: String,
    pub body: String,
}

/// Body of the single `/* ... */` comment in `sql`. More than one block
/// comment is ambiguous and rejected.
pub fn extract(sql: &str) -> Result<Option<&str>> {
    let block_comment = Regex::new(r"(?s)/\*(.*?)\*/")
        .map_err(|e| BqvError::Config(format!("annotation pattern: {}", e)))?;
    let mut comments = block_comment.captures_iter(sql);
    let Some(first) = comments.next() else {
        return Ok(None);
    };
    if comments.next().is_some() {
        return Err(BqvError::Config(
            "only one annotation comment per file is supported".into(),
        ));
    }
    Ok(first.get(1).map(|m| m.as_str()))
}

/// Split an annotation into manifests. A line `[kind]` opens a manifest;
/// the lines up to the next header are its body.
pub fn parse(annotation: &str) -> Vec<Manifest> {
    let mut manifests = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in annotation.lines() {
        if let Some(kind) = line.trim_end().strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if let Some((kind, body)) = current.take() {
                manifests.push(Manifest { kind, body: body.join("\n") });
            }
            current = Some((kind.to_string(), Vec::new()));
            continue;
        }
        match current.as_mut() {
            Some((_, body)) => body.push(line),
            None if line.trim().is_empty() => {}
            None => debug!("Ignoring annotation line outside a manifest: {}", line),
        }
    }
    if let Some((kind, body)) = current {
        manifests.push(Manifest { kind, body: body.join("\n") });
    }
    manifests
}

/// Every manifest of `kind` annotated on `sql`.
pub fn manifests_of(sql: &str, kind: &str) -> Result<Vec<Manifest>> {
    Ok(match extract(sql)? {
        Some(annotation) => parse(annotation).into_iter().filter(|m| m.kind == kind).collect(),
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_manifest() {
        let annotation = "\n[bqv:TEST]\nSELECT owner_user_id\nFROM dataset.view\nGROUP BY owner_user_id\n";
        let manifests = parse(annotation);
        assert_eq!(
            manifests,
            vec![Manifest {
                kind: TEST_MANIFEST.to_string(),
                body: "SELECT owner_user_id\nFROM dataset.view\nGROUP BY owner_user_id".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_several_manifests() {
        let manifests = parse("[bqv:TEST]\nSELECT 1\n[owner]\nfinance\n[bqv:TEST]\nSELECT 2");
        let kinds: Vec<&str> = manifests.iter().map(|m| m.kind.as_str()).collect();
        assert_eq!(kinds, vec!["bqv:TEST", "owner", "bqv:TEST"]);
        assert_eq!(manifests[2].body, "SELECT 2");
    }

    #[test]
    fn test_extract() {
        let sql = "/*\n[bqv:TEST]\nSELECT 1\n*/\nSELECT * FROM t";
        assert_eq!(extract(sql).unwrap(), Some("\n[bqv:TEST]\nSELECT 1\n"));
        assert_eq!(extract("SELECT 1").unwrap(), None);
        assert!(extract("/* a */ SELECT 1 /* b */").is_err());
    }

    #[test]
    fn test_manifests_of_filters_kind() {
        let sql = "/*\n[owner]\nfinance\n[bqv:TEST]\nASSERT TRUE\n*/\nSELECT 1";
        let tests = manifests_of(sql, TEST_MANIFEST).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].body, "ASSERT TRUE");
    }
}
