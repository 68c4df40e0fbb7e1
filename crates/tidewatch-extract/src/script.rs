//! Probe script construction.

use tidewatch_config::ExtractionConfig;

/// Appends the serialisation snippet to a descriptor script.
///
/// The whole document is built in memory so it can be written to the
/// sandbox in a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeScript {
    serializer_module: String,
    schema_variable: String,
}

impl ProbeScript {
    pub fn new(serializer_module: impl Into<String>, schema_variable: impl Into<String>) -> Self {
        Self {
            serializer_module: serializer_module.into(),
            schema_variable: schema_variable.into(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(&config.serializer_module, &config.schema_variable)
    }

    /// Local name bound to the serializer module inside the script.
    fn binding(&self) -> String {
        self.serializer_module
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    /// Descriptor followed by the probe snippet. The descriptor is kept
    /// byte for byte.
    pub fn render(&self, descriptor: &[u8]) -> Vec<u8> {
        let binding = self.binding();
        let snippet = format!(
            "\nlocal {binding} = require('{module}')\nprint({binding}.encode({variable}))\n",
            binding = binding,
            module = self.serializer_module,
            variable = self.schema_variable,
        );
        let mut doc = Vec::with_capacity(descriptor.len() + snippet.len());
        doc.extend_from_slice(descriptor);
        doc.extend_from_slice(snippet.as_bytes());
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(doc: Vec<u8>) -> String {
        String::from_utf8(doc).unwrap()
    }

    #[test]
    fn test_render_default() {
        let script = ProbeScript::from_config(&ExtractionConfig::default());
        let doc = text(script.render(b"configuration_options = {}"));
        assert_eq!(
            doc,
            "configuration_options = {}\n\
             local rapidjson = require('rapidjson')\n\
             print(rapidjson.encode(configuration_options))\n"
        );
    }

    #[test]
    fn test_render_descriptor_without_trailing_newline() {
        // A trailing comment must not swallow the appended statements.
        let doc = text(ProbeScript::new("rapidjson", "opts").render(b"x = 1 -- note"));
        assert!(doc.starts_with("x = 1 -- note\nlocal rapidjson"));
    }

    #[test]
    fn test_dotted_module_binding() {
        let doc = text(ProbeScript::new("cjson.safe", "opts").render(b""));
        assert!(doc.contains("local cjson_safe = require('cjson.safe')"));
        assert!(doc.contains("print(cjson_safe.encode(opts))"));
    }

    #[test]
    fn test_render_keeps_non_utf8_descriptor_bytes() {
        let descriptor = b"name = \"caf\xe9\"";
        let doc = ProbeScript::new("rapidjson", "opts").render(descriptor);
        assert!(doc.starts_with(descriptor));
        assert!(doc.ends_with(b"print(rapidjson.encode(opts))\n"));
    }
}
