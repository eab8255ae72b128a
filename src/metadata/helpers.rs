use quick_xml::events::BytesStart;

/// Get an unescaped attribute value from a BytesStart
pub(super) fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>, quick_xml::Error> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// True if the element's local name (prefix stripped) is `name`
pub(super) fn is_element(e: &BytesStart, name: &[u8]) -> bool {
    e.local_name().as_ref() == name
}

/// True for `ns0`, `ns1`, ... as produced by generic XML serializers
pub(super) fn is_synthetic_prefix(prefix: &[u8]) -> bool {
    prefix.len() > 2 && prefix.starts_with(b"ns") && prefix[2..].iter().all(u8::is_ascii_digit)
}
