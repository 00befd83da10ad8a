//! Final rendering by content type
//!
//! After the mapping chain has produced the merged values, the document's
//! source is rendered into its final form. Request-parameterized sources are
//! resolved first; then the MIME family decides: structured types serialize
//! the merged values when the source has no literal bytes, text types run
//! the literal bytes as a template against the values, everything else
//! passes through untouched.

use crate::error::SourceError;
use crate::mapping::render_template;
use crate::source::{
    is_json_mime, is_text_mime, is_yaml_mime, DataSource, Source,
};
use crate::value::Values;
use std::sync::Arc;

/// Render a source against the merged values.
///
/// `name` tags template-evaluation errors.
pub async fn process(
    name: &str,
    values: &Values,
    source: Arc<dyn Source>,
) -> Result<Arc<dyn Source>, SourceError> {
    let mapped = source.as_mappable().map(|m| m.map(values));
    let source = match mapped {
        Some(result) => result?,
        None => source,
    };
    let mime = source.mime_type().to_string();

    if is_json_mime(&mime) {
        return match source.bytes().await? {
            // Literal bytes win; values are not applied.
            Some(_) => Ok(source),
            None => {
                let data = serde_json::to_vec(values)
                    .map_err(|e| SourceError::Serialize(e.to_string()))?;
                Ok(Arc::new(DataSource::new(mime, data)))
            }
        };
    }
    if is_yaml_mime(&mime) {
        return match source.bytes().await? {
            Some(_) => Ok(source),
            None => {
                let data = serde_yaml::to_string(values)
                    .map_err(|e| SourceError::Serialize(e.to_string()))?;
                Ok(Arc::new(DataSource::new(mime, data.into_bytes())))
            }
        };
    }
    if is_text_mime(&mime) {
        let data = source.bytes().await?.unwrap_or_default();
        let text = String::from_utf8_lossy(&data);
        let rendered =
            render_template(&text, values).map_err(|e| SourceError::Render(format!(
                "{}: {}",
                name, e
            )))?;
        return Ok(Arc::new(DataSource::new(mime, rendered.into_bytes())));
    }

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ValuesSource, MIME_JSON, MIME_OCTET, MIME_TEXT, MIME_YAML};
    use crate::value::Value;

    fn values(pairs: &[(&str, Value)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_json_without_bytes_serializes_values() {
        let src: Arc<dyn Source> = Arc::new(ValuesSource::new(MIME_JSON, None));
        let out = process("doc", &values(&[("a", Value::Int(1))]), src)
            .await
            .unwrap();

        let data = out.bytes().await.unwrap().unwrap();
        let back: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(back, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_json_with_bytes_passes_through() {
        let src: Arc<dyn Source> =
            Arc::new(DataSource::new(MIME_JSON, br#"{"fixed":true}"#.to_vec()));
        let out = process("doc", &values(&[("a", Value::Int(1))]), src)
            .await
            .unwrap();
        assert_eq!(out.bytes().await.unwrap().unwrap(), br#"{"fixed":true}"#);
    }

    #[tokio::test]
    async fn test_yaml_without_bytes_round_trips() {
        let src: Arc<dyn Source> = Arc::new(ValuesSource::new(MIME_YAML, None));
        let out = process("doc", &values(&[("a", Value::Int(1))]), src)
            .await
            .unwrap();

        let data = out.bytes().await.unwrap().unwrap();
        let back: serde_yaml::Value = serde_yaml::from_slice(&data).unwrap();
        let expected: serde_yaml::Value = serde_yaml::from_str("a: 1").unwrap();
        assert_eq!(back, expected);
    }

    #[tokio::test]
    async fn test_text_template_renders_values() {
        let src: Arc<dyn Source> = Arc::new(DataSource::text(
            MIME_TEXT,
            "#!ipxe\nkernel {{ kernel }}",
        ));
        let out = process(
            "doc",
            &values(&[("kernel", Value::from("/boot/vmlinuz"))]),
            src,
        )
        .await
        .unwrap();

        assert_eq!(
            out.bytes().await.unwrap().unwrap(),
            b"#!ipxe\nkernel /boot/vmlinuz"
        );
    }

    #[tokio::test]
    async fn test_text_undefined_reference_fails() {
        let src: Arc<dyn Source> =
            Arc::new(DataSource::text(MIME_TEXT, "kernel {{ missing }}"));
        let err = process("doc", &Values::new(), src).await.unwrap_err();
        assert!(matches!(err, SourceError::Render(_)));
        assert!(err.to_string().contains("doc"));
    }

    #[tokio::test]
    async fn test_other_mime_passes_through() {
        let src: Arc<dyn Source> = Arc::new(DataSource::new(
            MIME_OCTET,
            b"binary {{ not a template }}".to_vec(),
        ));
        let out = process("doc", &Values::new(), src).await.unwrap();
        assert_eq!(
            out.bytes().await.unwrap().unwrap(),
            b"binary {{ not a template }}"
        );
    }
}
