use core::fmt;
use std::io::Write;

use serde::de::DeserializeOwned;

use crate::error::{Context as _, Error, Result};
use crate::resource::Resource;

pub fn from_str<T: DeserializeOwned>(text: &str, what: impl fmt::Display) -> Result<T> {
    serde_yaml::from_str(text).map_err(|err| Error::parse(format_args!("parsing {what}"), err))
}

pub fn to_string<T: serde::Serialize>(value: &T, what: impl fmt::Display) -> Result<String> {
    serde_yaml::to_string(value).map_err(|err| Error::parse(format_args!("serializing {what}"), err))
}

/// Writes resources as a YAML document stream, two-space indented, with a
/// `---` line between documents.
pub fn write_documents(out: &mut dyn Write, resources: &[Resource]) -> Result<()> {
    for (index, resource) in resources.iter().enumerate() {
        let text = to_string(resource, format_args!("resource {index}"))?;
        if index > 0 {
            writeln!(out, "---").context("writing output")?;
        }
        out.write_all(text.as_bytes()).context("writing output")?;
    }
    Ok(())
}

/// Splits a rendered multi-document stream on `---` separator lines.
pub fn split_documents(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n---\n")
        .map(str::trim)
        .filter(|doc| !doc.is_empty() && *doc != "---")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_stream_roundtrip() {
        let resources = [
            Resource::new(serde_yaml::from_str("kind: ConfigMap\n").unwrap()),
            Resource::new(serde_yaml::from_str("kind: Service\n").unwrap()),
        ];
        let mut out = Vec::new();
        write_documents(&mut out, &resources).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "kind: ConfigMap\n---\nkind: Service\n"
        );
    }

    #[test]
    fn split_skips_empty_documents() {
        let docs: Vec<_> = split_documents("a: 1\n---\n\n---\nb: 2\n").collect();
        assert_eq!(docs, ["a: 1", "b: 2"]);
    }
}
