//! Rendering of listed rows for the terminal.

use crate::resource::{extract_json_value, extract_short_name, get_resource, LOCATION_COLUMN};
use anyhow::Result;
use clap::ValueEnum;
use serde_json::{Map, Value};

/// How rows are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Rows of one resource type
pub struct ResourceRows<'a> {
    pub key: &'a str,
    pub rows: Vec<Value>,
}

/// Render results; several resource types are keyed by resource in JSON/YAML
pub fn render(format: OutputFormat, results: &[ResourceRows<'_>]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(results)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&structured(results))?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&structured(results))?),
    }
}

fn structured(results: &[ResourceRows<'_>]) -> Value {
    if let [single] = results {
        return Value::Array(single.rows.clone());
    }

    let map: Map<String, Value> = results
        .iter()
        .map(|r| (r.key.to_string(), Value::Array(r.rows.clone())))
        .collect();
    Value::Object(map)
}

fn render_table(results: &[ResourceRows<'_>]) -> String {
    let with_resource = results.len() > 1;

    let mut header = Vec::new();
    if with_resource {
        header.push("RESOURCE".to_string());
    }
    header.extend(["NAME", "LOCATION", "PROJECT"].map(String::from));

    let mut lines = vec![header];
    for result in results {
        let id_field = get_resource(result.key)
            .map(|def| def.id_field.as_str())
            .unwrap_or("name");

        for row in &result.rows {
            let mut line = Vec::new();
            if with_resource {
                line.push(result.key.to_string());
            }
            line.push(extract_short_name(&extract_json_value(row, id_field)));
            line.push(extract_json_value(row, LOCATION_COLUMN));
            line.push(extract_json_value(row, "project"));
            lines.push(line);
        }
    }

    let widths: Vec<usize> = (0..lines[0].len())
        .map(|col| lines.iter().map(|l| l[col].len()).max().unwrap_or(0))
        .collect();

    lines
        .iter()
        .map(|line| {
            line.iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"name": "vm-1", "location": "us-central1-a", "project": "alpha-project"}),
            json!({"name": "projects/p/locations/l/repositories/docker", "location": "europe-west1"}),
        ]
    }

    #[test]
    fn test_table_single_resource() {
        let out = render(
            OutputFormat::Table,
            &[ResourceRows {
                key: "compute-instances",
                rows: rows(),
            }],
        )
        .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "NAME    LOCATION       PROJECT");
        assert_eq!(lines[1], "vm-1    us-central1-a  alpha-project");
        assert_eq!(lines[2], "docker  europe-west1   -");
    }

    #[test]
    fn test_json_single_is_array() {
        let out = render(
            OutputFormat::Json,
            &[ResourceRows {
                key: "compute-instances",
                rows: rows(),
            }],
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_yaml_multiple_keyed_by_resource() {
        let out = render(
            OutputFormat::Yaml,
            &[
                ResourceRows {
                    key: "compute-disks",
                    rows: vec![],
                },
                ResourceRows {
                    key: "compute-networks",
                    rows: vec![json!({"name": "default"})],
                },
            ],
        )
        .unwrap();

        let parsed: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(parsed["compute-disks"], json!([]));
        assert_eq!(parsed["compute-networks"][0]["name"], "default");
    }
}
