//! Rewriting OME-XML so its channel description matches a new plane stack.

use std::io::Write;

use log::debug;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::{Namespace, QName, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;

use super::helpers::{is_element, is_synthetic_prefix};
use super::MetadataSyncError;

/// Declaration emitted at the top of every synchronized document
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// The `Pixels` element currently being rewritten
struct PixelsScope {
    depth: usize,
    prefix: String,
    has_tiff_data: bool,
}

/// A synthetic root prefix (`<ns0:OME xmlns:ns0="..">`) turned into the
/// default namespace
struct Promotion {
    prefix: Vec<u8>,
    uri: Vec<u8>,
    /// Some name keeps the prefix, so `xmlns:nsN` must stay declared
    keep_declaration: bool,
}

impl Promotion {
    /// Only a root whose own prefix is synthetic, bound on the root itself,
    /// with no default namespace declared there
    fn for_root(e: &BytesStart) -> Result<Option<Self>, MetadataSyncError> {
        let prefix = match e.name().prefix() {
            Some(prefix) if is_synthetic_prefix(prefix.as_ref()) => prefix.as_ref().to_vec(),
            _ => return Ok(None),
        };

        let mut uri = None;
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                return Ok(None);
            }
            if key.strip_prefix(b"xmlns:") == Some(prefix.as_slice()) {
                uri = Some(attr.value.into_owned());
            }
        }

        Ok(uri.map(|uri| Promotion {
            prefix,
            uri,
            keep_declaration: false,
        }))
    }

    /// True if the element `name` keeps its namespace without a prefix: its
    /// synthetic prefix resolves to the promoted URI and so does the default
    /// namespace in scope.
    fn strips(&self, reader: &NsReader<&[u8]>, name: QName) -> bool {
        if !name.prefix().is_some_and(|p| is_synthetic_prefix(p.as_ref())) {
            return false;
        }
        let uri = self.uri.as_slice();
        let bound_to_promoted = matches!(
            reader.resolve_element(name).0,
            ResolveResult::Bound(Namespace(ns)) if ns == uri
        );
        let default_is_promoted = match reader.resolve(QName(b"_"), false).0 {
            ResolveResult::Bound(Namespace(ns)) => ns == uri,
            _ => true,
        };
        bound_to_promoted && default_is_promoted
    }

    fn note_usage(&mut self, reader: &NsReader<&[u8]>, e: &BytesStart) -> Result<(), MetadataSyncError> {
        let prefix = self.prefix.as_slice();
        if e.name().prefix().is_some_and(|p| p.as_ref() == prefix) && !self.strips(reader, e.name()) {
            self.keep_declaration = true;
        }
        // attribute prefixes are never stripped
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.prefix().is_some_and(|p| p.as_ref() == prefix) {
                self.keep_declaration = true;
            }
        }
        Ok(())
    }
}

/// What the first pass learns about the document
struct DocumentPlan {
    pixels: usize,
    promotion: Option<Promotion>,
}

/// Rewrite `metadata` to describe a `width` x `height` image with `channel_names`.
///
/// - `SizeX`, `SizeY` and `SizeC` on `Pixels` are replaced.
/// - Every `TiffData` under `Pixels` gets `PlaneCount = channel_names.len()`;
///   one is created when none exists.
/// - All existing `Channel` entries are dropped and one entry per name is
///   written, in order, as `<Channel ID="Channel:i" Name=".." SamplesPerPixel="1"/>`.
/// - A synthetic root prefix (`ns0:OME`) becomes the default namespace and is
///   removed from every element bound to the same URI. Other prefixes and
///   their declarations are left alone, so the output stays namespace
///   well-formed.
///
/// The result starts with a single [`XML_DECLARATION`].
///
/// # Errors
///
/// [`MetadataSyncError::MissingDeclaration`] unless the input starts with
/// `<?xml`, [`MetadataSyncError::MissingPixels`] /
/// [`MetadataSyncError::MultiplePixels`] unless there is exactly one `Pixels`
/// element, and XML errors for malformed input.
pub fn synchronize<S: AsRef<str>>(
    metadata: &str,
    width: usize,
    height: usize,
    channel_names: &[S],
) -> Result<String, MetadataSyncError> {
    let document = metadata.strip_prefix('\u{feff}').unwrap_or(metadata);
    if !document.starts_with("<?xml") {
        return Err(MetadataSyncError::MissingDeclaration);
    }

    let plan = plan_document(document)?;
    match plan.pixels {
        0 => return Err(MetadataSyncError::MissingPixels),
        1 => {}
        n => return Err(MetadataSyncError::MultiplePixels(n)),
    }
    let promotion = plan.promotion.as_ref();

    let channel_count = channel_names.len().to_string();
    let size_attrs = [
        ("SizeX", width.to_string()),
        ("SizeY", height.to_string()),
        ("SizeC", channel_count.clone()),
    ];
    let plane_count_attrs = [("PlaneCount", channel_count)];

    let mut reader = NsReader::from_str(document);
    let mut writer = Writer::new(Vec::new());
    // Output names of the open elements
    let mut open: Vec<String> = Vec::new();
    let mut pixels: Option<PixelsScope> = None;
    // Nesting inside a Channel subtree being dropped
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event()?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Decl(_) => {}
            Event::Start(e) => {
                let depth = open.len() + 1;
                let child_of_pixels = pixels.as_ref().is_some_and(|p| depth == p.depth + 1);
                if child_of_pixels && is_element(&e, b"Channel") {
                    skip_depth = 1;
                    continue;
                }

                let name = output_name(&reader, &e, promotion)?;
                let root = if open.is_empty() { promotion } else { None };

                if is_element(&e, b"Pixels") {
                    let start = rewrite_start(&e, &name, &size_attrs, root)?;
                    writer.write_event(Event::Start(start))?;
                    let prefix = name_prefix(&name);
                    write_channel_entries(&mut writer, &prefix, channel_names)?;
                    pixels = Some(PixelsScope {
                        depth,
                        prefix,
                        has_tiff_data: false,
                    });
                } else if child_of_pixels && is_element(&e, b"TiffData") {
                    if let Some(scope) = pixels.as_mut() {
                        scope.has_tiff_data = true;
                    }
                    let start = rewrite_start(&e, &name, &plane_count_attrs, root)?;
                    writer.write_event(Event::Start(start))?;
                } else {
                    writer.write_event(Event::Start(rewrite_start(&e, &name, &[], root)?))?;
                }
                open.push(name);
            }
            Event::Empty(e) => {
                let depth = open.len() + 1;
                let child_of_pixels = pixels.as_ref().is_some_and(|p| depth == p.depth + 1);
                if child_of_pixels && is_element(&e, b"Channel") {
                    // dropped, replaced by the entries written after <Pixels>
                    continue;
                }

                let name = output_name(&reader, &e, promotion)?;
                let root = if open.is_empty() { promotion } else { None };

                if is_element(&e, b"Pixels") {
                    let start = rewrite_start(&e, &name, &size_attrs, root)?;
                    writer.write_event(Event::Start(start))?;
                    let prefix = name_prefix(&name);
                    write_channel_entries(&mut writer, &prefix, channel_names)?;
                    write_tiff_data(&mut writer, &prefix, &plane_count_attrs[0].1)?;
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                } else if child_of_pixels && is_element(&e, b"TiffData") {
                    if let Some(scope) = pixels.as_mut() {
                        scope.has_tiff_data = true;
                    }
                    let start = rewrite_start(&e, &name, &plane_count_attrs, root)?;
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Empty(rewrite_start(&e, &name, &[], root)?))?;
                }
            }
            Event::End(_) => {
                let depth = open.len();
                if pixels.as_ref().is_some_and(|p| p.depth == depth) {
                    if let Some(scope) = pixels.take() {
                        if !scope.has_tiff_data {
                            write_tiff_data(&mut writer, &scope.prefix, &plane_count_attrs[0].1)?;
                        }
                    }
                }
                let name = open.pop().unwrap_or_default();
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    let body = String::from_utf8(writer.into_inner())?;
    debug!(
        "Synchronized OME-XML: {}x{}, {} channels",
        width,
        height,
        channel_names.len()
    );
    Ok(format!("{}\n{}", XML_DECLARATION, body.trim_start()))
}

/// Count `Pixels` elements and decide on prefix promotion
fn plan_document(document: &str) -> Result<DocumentPlan, MetadataSyncError> {
    let mut reader = NsReader::from_str(document);
    let mut pixels = 0;
    let mut promotion: Option<Promotion> = None;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if !seen_root {
                    seen_root = true;
                    promotion = Promotion::for_root(&e)?;
                }
                if is_element(&e, b"Pixels") {
                    pixels += 1;
                }
                if let Some(promotion) = promotion.as_mut() {
                    promotion.note_usage(&reader, &e)?;
                }
            }
            Event::Eof => return Ok(DocumentPlan { pixels, promotion }),
            _ => {}
        }
    }
}

/// Qualified name to write for `e`, without the promoted prefix where it can go
fn output_name(
    reader: &NsReader<&[u8]>,
    e: &BytesStart,
    promotion: Option<&Promotion>,
) -> Result<String, MetadataSyncError> {
    let name = e.name();
    let bytes = match promotion {
        Some(promotion) if promotion.strips(reader, name) => name.local_name().into_inner(),
        _ => name.into_inner(),
    };
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

/// Copy a start tag under `name`, replacing (or appending) `overrides`.
///
/// On the root element `root` swaps the promoted `xmlns:nsN` declaration for
/// a default namespace declaration.
fn rewrite_start(
    e: &BytesStart,
    name: &str,
    overrides: &[(&str, String)],
    root: Option<&Promotion>,
) -> Result<BytesStart<'static>, MetadataSyncError> {
    let mut out = BytesStart::new(name.to_owned());

    let mut applied = vec![false; overrides.len()];
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = attr.key.as_ref();

        if let Some(i) = overrides.iter().position(|(k, _)| k.as_bytes() == key) {
            let (k, v) = &overrides[i];
            out.push_attribute((*k, v.as_str()));
            applied[i] = true;
            continue;
        }

        if let Some(promotion) = root {
            if key.strip_prefix(b"xmlns:") == Some(promotion.prefix.as_slice()) {
                out.push_attribute((b"xmlns".as_slice(), promotion.uri.as_slice()));
                if promotion.keep_declaration {
                    out.push_attribute(attr);
                }
                continue;
            }
        }

        out.push_attribute(attr);
    }

    for ((k, v), done) in overrides.iter().zip(applied) {
        if !done {
            out.push_attribute((*k, v.as_str()));
        }
    }

    Ok(out)
}

/// `"ome:"` for `ome:Pixels`, `""` for `Pixels`
fn name_prefix(name: &str) -> String {
    match name.rfind(':') {
        Some(i) => name[..=i].to_string(),
        None => String::new(),
    }
}

fn write_channel_entries<W: Write, S: AsRef<str>>(
    writer: &mut Writer<W>,
    prefix: &str,
    channel_names: &[S],
) -> Result<(), MetadataSyncError> {
    for (index, name) in channel_names.iter().enumerate() {
        let id = format!("Channel:{}", index);
        let mut channel = BytesStart::new(format!("{}Channel", prefix));
        channel.push_attribute(("ID", id.as_str()));
        channel.push_attribute(("Name", name.as_ref()));
        channel.push_attribute(("SamplesPerPixel", "1"));
        writer.write_event(Event::Empty(channel))?;
    }
    Ok(())
}

fn write_tiff_data<W: Write>(
    writer: &mut Writer<W>,
    prefix: &str,
    plane_count: &str,
) -> Result<(), MetadataSyncError> {
    let mut tiff_data = BytesStart::new(format!("{}TiffData", prefix));
    tiff_data.push_attribute(("PlaneCount", plane_count));
    writer.write_event(Event::Empty(tiff_data))?;
    Ok(())
}
