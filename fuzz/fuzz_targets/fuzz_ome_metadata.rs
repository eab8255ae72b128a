#![no_main]

use libfuzzer_sys::fuzz_target;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use combine_channels::metadata::{channel_names_from_ome_xml, extract_channel_names, synchronize};

/// False if the document does not parse or uses an undeclared prefix
fn namespaces_bound(xml: &str) -> bool {
    let mut reader = NsReader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if matches!(reader.resolve_element(e.name()).0, ResolveResult::Unknown(_)) {
                    return false;
                }
                for attr in e.attributes() {
                    let Ok(attr) = attr else {
                        return false;
                    };
                    if matches!(reader.resolve_attribute(attr.key).0, ResolveResult::Unknown(_)) {
                        return false;
                    }
                }
            }
            Ok(Event::Eof) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

fuzz_target!(|data: &[u8]| {
    // Metadata comes from untrusted files: parsing and rewriting must never panic
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = extract_channel_names(&[Some(text.to_string())]);

    if let Ok(names) = channel_names_from_ome_xml(text) {
        if let Ok(xml) = synchronize(text, 8, 8, &names) {
            // A synchronized document must describe exactly the names it was given
            let resynced = channel_names_from_ome_xml(&xml).ok();
            assert!(resynced.is_none() || resynced == Some(names));

            // Prefix rewriting must not leave a prefix without its declaration
            if namespaces_bound(text) {
                assert!(namespaces_bound(&xml), "unbound prefix after sync:\n{}", xml);
            }
        }
    }
});
