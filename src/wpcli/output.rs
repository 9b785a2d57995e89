//! Parsing of `wp <type> list` output.
//!
//! JSON (`--format=json`) is requested, but older WP-CLI releases and some
//! wrappers still print a table. Both are accepted.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Module name to the version WordPress reports for it.
pub type VisibleModules = BTreeMap<String, Option<String>>;

#[derive(Debug, Deserialize)]
struct ListedModule {
    name: String,
    #[serde(default)]
    version: Value,
}

fn version_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Parse list output. The error is a human readable reason.
pub fn parse_module_list(stdout: &str) -> Result<VisibleModules, String> {
    if stdout.trim().is_empty() {
        return Err("no output".to_string());
    }

    // PHP notices may surround the JSON document, and their timestamps
    // start with '[' as well.
    let lines: Vec<&str> = stdout.lines().collect();
    for (start, line) in lines.iter().enumerate() {
        if !line.trim_start().starts_with('[') {
            continue;
        }
        if let Some(listed) = parse_json_from(&lines[start..].join("\n")) {
            return Ok(listed
                .into_iter()
                .map(|m| (m.name, version_text(&m.version)))
                .collect());
        }
    }

    parse_table(stdout)
}

/// First JSON list in `document`, ignoring whatever follows it.
fn parse_json_from(document: &str) -> Option<Vec<ListedModule>> {
    serde_json::Deserializer::from_str(document)
        .into_iter::<Vec<ListedModule>>()
        .next()?
        .ok()
}

fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let cells: Vec<&str> = if line.contains('|') {
        line.trim_matches('|').split('|').collect()
    } else if line.contains('\t') {
        line.split('\t').collect()
    } else if line.contains(',') {
        line.split(',').collect()
    } else {
        line.split_whitespace().collect()
    };
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

fn parse_table(stdout: &str) -> Result<VisibleModules, String> {
    let mut rows = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('+'));

    let header = rows.next().map(split_row).ok_or("no header row")?;
    let column = |wanted: &str| {
        header
            .iter()
            .position(|cell| cell.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("missing '{}' column", wanted))
    };
    let name_column = column("name")?;
    let version_column = column("version")?;

    let mut modules = VisibleModules::new();
    for row in rows.map(split_row) {
        let Some(name) = row.get(name_column).filter(|n| !n.is_empty()) else {
            continue;
        };
        let version = row
            .get(version_column)
            .filter(|v| !v.is_empty())
            .cloned();
        modules.insert(name.clone(), version);
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let out = r#"[{"name":"akismet","version":"5.3"},{"name":"hello","version":""},{"name":"old","version":1.2}]"#;
        let modules = parse_module_list(out).unwrap();
        assert_eq!(modules.len(), 3);
        assert_eq!(modules["akismet"].as_deref(), Some("5.3"));
        assert_eq!(modules["hello"], None);
        assert_eq!(modules["old"].as_deref(), Some("1.2"));
    }

    #[test]
    fn test_parse_json_after_php_notice() {
        let out = "PHP Notice: Undefined index in wp-config.php\n[{\"name\":\"akismet\",\"version\":\"5.3\"}]\n";
        let modules = parse_module_list(out).unwrap();
        assert_eq!(modules["akismet"].as_deref(), Some("5.3"));
    }

    #[test]
    fn test_parse_json_after_timestamped_warning() {
        let out = "[18-Oct-2026 09:12:44 UTC] PHP Warning:  Undefined array key \"HTTP_HOST\" in wp-config.php on line 80\n\
                   [{\"name\":\"akismet\",\"version\":\"5.3\"}]\n\
                   [18-Oct-2026 09:12:44 UTC] PHP Deprecated:  Creation of dynamic property\n";
        let modules = parse_module_list(out).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules["akismet"].as_deref(), Some("5.3"));
    }

    #[test]
    fn test_parse_empty_json_list() {
        assert!(parse_module_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ascii_table() {
        let out = "\
+----------+----------+--------+---------+
| name     | status   | update | version |
+----------+----------+--------+---------+
| akismet  | active   | none   | 5.3     |
| seo-tool | inactive | none   | 3.1.0   |
+----------+----------+--------+---------+
";
        let modules = parse_module_list(out).unwrap();
        assert_eq!(modules["akismet"].as_deref(), Some("5.3"));
        assert_eq!(modules["seo-tool"].as_deref(), Some("3.1.0"));
    }

    #[test]
    fn test_parse_tab_separated_table() {
        let out = "name\tstatus\tversion\nakismet\tactive\t5.3\nhello\tinactive\t\n";
        let modules = parse_module_list(out).unwrap();
        assert_eq!(modules["akismet"].as_deref(), Some("5.3"));
        assert_eq!(modules["hello"], None);
    }

    #[test]
    fn test_parse_csv_table_with_reordered_columns() {
        let out = "version,name\n5.3,akismet\n";
        let modules = parse_module_list(out).unwrap();
        assert_eq!(modules["akismet"].as_deref(), Some("5.3"));
    }

    #[test]
    fn test_missing_columns_fail() {
        let err = parse_module_list("name status\nakismet active\n").unwrap_err();
        assert!(err.contains("version"));

        let err = parse_module_list("title version\nAkismet 5.3\n").unwrap_err();
        assert!(err.contains("name"));
    }

    #[test]
    fn test_empty_output_fails() {
        assert!(parse_module_list("").is_err());
        assert!(parse_module_list("  \n").is_err());
    }
}
