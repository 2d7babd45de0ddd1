use base64::{Engine as _, engine::general_purpose::STANDARD};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};

/// Decoded SAML response posted back to the ACS URL
#[derive(Debug)]
pub struct SamlResponse {
    decoded_xml: Vec<u8>,
}

impl SamlResponse {
    /// Create from Base64-encoded response
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Saml(format!("cannot decode base64: {e}")))?;
        Ok(Self {
            decoded_xml: decoded,
        })
    }

    /// Values of every `<Attribute Name="attribute_name">`, namespace prefix ignored
    pub fn get_attribute_values(&self, attribute_name: &str) -> Result<Vec<String>> {
        let mut reader = Reader::from_reader(self.decoded_xml.as_slice());
        reader.config_mut().trim_text(true);

        let mut values = Vec::new();
        let mut in_target_attribute = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e) | Event::Empty(ref e)) => {
                    if e.local_name().as_ref() == b"Attribute" {
                        in_target_attribute = check_attribute_name(e, attribute_name);
                    }
                }
                Ok(Event::Text(e)) if in_target_attribute => {
                    values.push(String::from_utf8_lossy(e.as_ref()).to_string());
                }
                Ok(Event::End(ref e)) => {
                    if e.local_name().as_ref() == b"Attribute" {
                        in_target_attribute = false;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Saml(format!("cannot parse XML: {e}"))),
                _ => {}
            }
            buf.clear();
        }

        if values.is_empty() {
            return Err(Error::Saml(format!(
                "no values found for attribute: {attribute_name}"
            )));
        }

        Ok(values)
    }
}

fn check_attribute_name(e: &BytesStart, attribute_name: &str) -> bool {
    e.attributes().filter_map(|a| a.ok()).any(|attr| {
        attr.key.as_ref() == b"Name" && attr.value.as_ref() == attribute_name.as_bytes()
    })
}
