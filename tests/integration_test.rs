//! Integration tests for combine-channels
//!
//! These tests write real multi-page TIFF files, run the pipeline on them and
//! decode the result again.

use combine_channels::metadata::{channel_names_from_ome_xml, extract_channel_names};
use combine_channels::pipeline::{Pipeline, PipelineConfig, PipelineError, COMBINED_MEMBRANE};
use combine_channels::stack::CombineMethod;
use combine_channels::tiff_io::{read_tiff_pages, TiffCompression, TiffPage};
use std::fs::File;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use tiff::encoder::colortype::Gray16;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const WIDTH: u32 = 4;
const HEIGHT: u32 = 3;

fn ome_xml(names: &[&str]) -> String {
    let channels: String = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                r#"<Channel ID="Channel:0:{}" Name="{}" SamplesPerPixel="1"/>"#,
                i, name
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06" Creator="test">
<Image ID="Image:0" Name="sample"><Pixels ID="Pixels:0" DimensionOrder="XYCZT" Type="uint16" SizeX="{}" SizeY="{}" SizeC="{}" SizeZ="1" SizeT="1">{}<TiffData IFD="0" PlaneCount="{}"/></Pixels></Image>
</OME>"#,
        WIDTH,
        HEIGHT,
        names.len(),
        channels,
        names.len()
    )
}

/// Write one page per plane; `descriptions[i]` goes on page `i`
fn write_tiff(path: &Path, planes: &[Vec<u16>], descriptions: &[Option<String>]) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    for (i, samples) in planes.iter().enumerate() {
        let mut image = encoder.new_image::<Gray16>(WIDTH, HEIGHT).unwrap();
        if let Some(Some(description)) = descriptions.get(i) {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description.as_str())
                .unwrap();
        }
        image.write_data(samples).unwrap();
    }
}

fn ramp(offset: u16) -> Vec<u16> {
    (0..(WIDTH * HEIGHT) as u16).map(|v| v * 3 + offset).collect()
}

fn dapi_tritc_cd45() -> Vec<Vec<u16>> {
    let dapi = ramp(1);
    let tritc: Vec<u16> = (0..(WIDTH * HEIGHT) as u16).rev().map(|v| v * 5).collect();
    let cd45 = tritc.iter().zip(&dapi).map(|(t, d)| t + d).collect();
    vec![dapi, tritc, cd45]
}

fn read_back(path: &Path) -> Vec<TiffPage> {
    read_tiff_pages(File::open(path).unwrap()).unwrap()
}

/// Membrane markers merged by maximum into a two-channel OME-TIFF
#[test]
fn test_ome_tiff_max_combination() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.ome.tiff");
    let output = dir.path().join("output.ome.tiff");

    let planes = dapi_tritc_cd45();
    write_tiff(&input, &planes, &[Some(ome_xml(&["DAPI", "TRITC", "CD45"]))]);

    let config = PipelineConfig::new("DAPI", vec!["TRITC".into(), "CD45".into()])
        .with_method(CombineMethod::Max);
    let result = Pipeline::new(config).run_path(&input).unwrap();
    result
        .write_tiff(File::create(&output).unwrap(), TiffCompression::Lzw)
        .unwrap();

    let pages = read_back(&output);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].plane.samples(), planes[0].as_slice());
    // CD45 = TRITC + DAPI dominates TRITC everywhere
    assert_eq!(pages[1].plane.samples(), planes[2].as_slice());

    let xml = pages[0].description.as_deref().unwrap();
    assert!(xml.contains(r#"SizeX="4" SizeY="3" SizeC="2""#));
    assert!(xml.contains(r#"PlaneCount="2""#));
    assert!(xml.contains(r#"Creator="test""#));
    assert_eq!(
        channel_names_from_ome_xml(xml).unwrap(),
        vec!["DAPI", COMBINED_MEMBRANE]
    );
    assert_eq!(pages[1].description, None);
}

/// A single membrane channel is copied as-is and keeps its name
#[test]
fn test_ome_tiff_single_membrane() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.ome.tiff");

    let planes = dapi_tritc_cd45();
    write_tiff(&input, &planes, &[Some(ome_xml(&["DAPI", "TRITC", "CD45"]))]);

    let config = PipelineConfig::new("DAPI", vec!["TRITC".into()]);
    let result = Pipeline::new(config).run_path(&input).unwrap();

    assert_eq!(result.stack.names(), vec!["DAPI", "TRITC"]);
    assert_eq!(
        result.stack.channel("TRITC").unwrap().plane().samples(),
        planes[1].as_slice()
    );
    let names = channel_names_from_ome_xml(result.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(names, vec!["DAPI", "TRITC"]);
}

/// Product of large values is rescaled so the brightest pixel is 65535
#[test]
fn test_ome_tiff_prod_overflow() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.ome.tiff");

    let bright = vec![60000u16; (WIDTH * HEIGHT) as usize];
    let mut dim = vec![1u16; (WIDTH * HEIGHT) as usize];
    dim[5] = 3;
    let planes = vec![ramp(0), bright, dim];
    write_tiff(&input, &planes, &[Some(ome_xml(&["DNA", "A", "B"]))]);

    let config = PipelineConfig::new("DNA", vec!["A".into(), "B".into()]);
    let result = Pipeline::new(config).run_path(&input).unwrap();

    let combined = result.stack.channel(COMBINED_MEMBRANE).unwrap().plane();
    assert_eq!(combined.samples()[5], u16::MAX);
    assert_eq!(combined.samples()[0], 21845);
    assert_eq!(combined.max_value(), u16::MAX);
}

/// MIBI-TIFF names come from per-page JSON; no OME-XML is written back
#[test]
fn test_mibi_tiff_lenient() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.tiff");
    let output = dir.path().join("output.tiff");

    let targets = ["CD45", "dsDNA", "HLA-DR"];
    let descriptions: Vec<Option<String>> = targets
        .iter()
        .enumerate()
        .map(|(i, target)| {
            Some(format!(
                r#"{{"channel.mass": {}, "channel.target": "{}", "fov_id": "FOV1"}}"#,
                89 + i,
                target
            ))
        })
        .collect();
    let planes = vec![ramp(7), ramp(1), ramp(2)];
    write_tiff(&input, &planes, &descriptions);

    let pages = read_back(&input);
    let found: Vec<Option<String>> = pages.into_iter().map(|p| p.description).collect();
    assert_eq!(extract_channel_names(&found).unwrap(), targets);

    let config = PipelineConfig::new("dsDNA", vec!["CD45".into(), "HLA-DR".into()])
        .with_method(CombineMethod::Max);
    let result = Pipeline::new(config).run_path(&input).unwrap();
    assert_eq!(result.metadata, None);

    std::fs::write(&output, result.to_tiff_bytes(TiffCompression::None).unwrap()).unwrap();
    let pages = read_back(&output);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].plane.samples(), planes[1].as_slice());
    assert_eq!(pages[1].plane.samples(), planes[0].as_slice());
    assert!(pages.iter().all(|p| p.description.is_none()));
}

/// Strict mode turns a metadata sync failure into an error
#[test]
fn test_mibi_tiff_strict() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.tiff");

    let descriptions = vec![
        Some(r#"{"channel.target": "dsDNA"}"#.to_string()),
        Some(r#"{"channel.target": "CD45"}"#.to_string()),
    ];
    write_tiff(&input, &[ramp(0), ramp(1)], &descriptions);

    let config = PipelineConfig::new("dsDNA", vec!["CD45".into()]).with_strict(true);
    let err = Pipeline::new(config).run_path(&input).unwrap_err();
    assert!(matches!(err, PipelineError::SyncError(_)));
}

#[test]
fn test_missing_input_file() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig::new("DAPI", vec!["TRITC".into()]);
    let err = Pipeline::new(config)
        .run_path(dir.path().join("missing.tiff"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::IoError(_)));
}

/// The binary writes only TIFF bytes to stdout
#[test]
fn test_cli_combine_to_stdout() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.ome.tiff");
    write_tiff(
        &input,
        &dapi_tritc_cd45(),
        &[Some(ome_xml(&["DAPI", "TRITC", "CD45"]))],
    );

    let output = Command::new(env!("CARGO_BIN_EXE_combine-channels"))
        .arg("-v")
        .arg("combine")
        .arg(&input)
        .args(["--nuclear-channel", "DAPI"])
        .args(["--membrane-channel", "TRITC", "--membrane-channel", "CD45"])
        .args(["--combine-method", "max"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let pages = read_tiff_pages(std::io::Cursor::new(output.stdout)).unwrap();
    assert_eq!(pages.len(), 2);
    let names = channel_names_from_ome_xml(pages[0].description.as_deref().unwrap()).unwrap();
    assert_eq!(names, vec!["DAPI", COMBINED_MEMBRANE]);
}

#[test]
fn test_cli_config_file_and_channels() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.ome.tiff");
    let output_path = dir.path().join("output.ome.tiff");
    let config_path = dir.path().join("combine.toml");

    write_tiff(
        &input,
        &dapi_tritc_cd45(),
        &[Some(ome_xml(&["DAPI", "TRITC", "CD45"]))],
    );
    std::fs::write(
        &config_path,
        "[combine]\nnuclear_channel = \"DAPI\"\nmembrane_channels = [\"CD45\"]\ncompression = \"deflate\"\n",
    )
    .unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_combine-channels"))
        .arg("combine")
        .arg(&input)
        .arg("--config")
        .arg(&config_path)
        .arg("-o")
        .arg(&output_path)
        .status()
        .unwrap();
    assert!(status.success());

    let listing = Command::new(env!("CARGO_BIN_EXE_combine-channels"))
        .arg("channels")
        .arg(&output_path)
        .output()
        .unwrap();
    assert!(listing.status.success());
    let stdout = String::from_utf8(listing.stdout).unwrap();
    assert!(stdout.contains("DAPI"));
    assert!(stdout.contains("CD45"));
    assert!(!stdout.contains("TRITC"));
}

#[test]
fn test_cli_unknown_channel_fails_without_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.ome.tiff");
    let output_path = dir.path().join("output.ome.tiff");
    write_tiff(
        &input,
        &dapi_tritc_cd45(),
        &[Some(ome_xml(&["DAPI", "TRITC", "CD45"]))],
    );

    let output = Command::new(env!("CARGO_BIN_EXE_combine-channels"))
        .arg("combine")
        .arg(&input)
        .args(["--nuclear-channel", "Hoechst", "--membrane-channel", "CD45"])
        .arg("-o")
        .arg(&output_path)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!output_path.exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Hoechst"));
}
