use std::fs;
use std::sync::Arc;

use knowledgebase_mcp::{
    ConstructionFacade, DocxOptions, ErrorKind, ExtractionFacade, FormatRegistry, ServerConfig, probe,
};
use serde_json::json;
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn facades() -> (ExtractionFacade, ConstructionFacade) {
    let config = ServerConfig::default();
    let registry = Arc::new(FormatRegistry::from_probe(&probe(), &config));
    (
        ExtractionFacade::new(registry.clone(), config.xlsx_sample_rows),
        ConstructionFacade::new(registry, config.max_column_width),
    )
}

#[cfg(feature = "docx")]
#[test]
fn test_plain_text_round_trips_through_docx() {
    init_logging();
    let (extraction, construction) = facades();
    let dir = tempdir().unwrap();
    let target = dir.path().join("plain.docx");

    let content = "Dear team,\n\n  indented line\nTotal - 5 items\n2. is not a list here\nQuotes \"and\" <tags> & 'apostrophes'\n\t\ttabbed\n   \nLast line";
    let outcome = construction
        .create_document(content, &target, &DocxOptions::default())
        .unwrap();
    assert!(outcome.bytes_written > 0);

    let result = extraction.extract_single(&target);
    assert!(result.is_ok());
    assert_eq!(result.text_content, content);
    assert_eq!(result.structured_metadata.paragraph_count, Some(7));
}

#[cfg(feature = "docx")]
#[test]
fn test_valid_and_corrupt_file_in_one_scan() {
    init_logging();
    let (extraction, construction) = facades();
    let dir = tempdir().unwrap();

    construction
        .create_document("Readable", &dir.path().join("good.docx"), &DocxOptions::default())
        .unwrap();
    fs::write(dir.path().join("bad.docx"), b"this is not a zip").unwrap();

    let scan = extraction.extract_directory(dir.path(), false);
    assert_eq!(scan.results.len(), 2);
    assert_eq!(scan.succeeded, 1);
    assert_eq!(scan.failed, 1);

    let bad = scan.results.iter().find(|r| r.source_path.ends_with("bad.docx")).unwrap();
    assert_eq!(bad.error.as_ref().unwrap().kind, ErrorKind::ExtractionFailed);
    let good = scan.results.iter().find(|r| r.source_path.ends_with("good.docx")).unwrap();
    assert_eq!(good.text_content, "Readable");

    let listing = extraction.list_supported(dir.path(), false).unwrap();
    assert_eq!(listing.files.len(), 2);
}

#[cfg(feature = "docx")]
#[test]
fn test_structured_docx_report() {
    init_logging();
    let (extraction, construction) = facades();
    let dir = tempdir().unwrap();
    let target = dir.path().join("report.docx");

    let report = json!({
        "title": "Quarterly Review",
        "summary": "Revenue grew.",
        "sections": [
            {"title": "Highlights", "content": ["New office", "Two hires"]},
            {"title": "Details", "content": "See below", "subsections": [
                {"title": "Costs", "content": "Flat"}
            ]}
        ]
    });
    let outcome = construction.create_docx_report(&report, &target).unwrap();
    assert_eq!(outcome.sections, vec!["Highlights", "Details"]);

    let text = extraction.extract_single(&target).text_content;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Quarterly Review");
    assert_eq!(lines[1], "Executive Summary");
    for expected in ["New office", "Two hires", "Costs", "Flat"] {
        assert!(lines.contains(&expected), "missing {:?}", expected);
    }
}

#[cfg(feature = "xlsx")]
#[test]
fn test_frames_and_report_workbooks() {
    init_logging();
    let (extraction, construction) = facades();
    let dir = tempdir().unwrap();

    let frames = dir.path().join("frames.xlsx");
    let frame_data = json!({
        "Scores": {"columns": ["name", "score"], "data": [["Ana", 90], ["Bo", 72]], "index": ["a", "b"]}
    });
    construction.create_from_frames(&frame_data, &frames, true, true).unwrap();
    let result = extraction.extract_single(&frames);
    assert_eq!(result.structured_metadata.sheet_names, Some(vec!["Scores".to_string()]));
    assert!(result.text_content.contains("Dimensions: 2 rows x 3 columns"));
    assert!(result.text_content.contains("Ana"));

    let report = dir.path().join("report.xlsx");
    let report_data = json!({
        "title": "Inventory",
        "description": "Stock levels",
        "data": {"Stock": [{"item": "bolts", "count": 40}]}
    });
    let outcome = construction.create_xlsx_report(&report_data, &report).unwrap();
    assert_eq!(outcome.sections, vec!["Summary", "Stock"]);

    let result = extraction.extract_single(&report);
    assert_eq!(
        result.structured_metadata.sheet_names,
        Some(vec!["Summary".to_string(), "Stock".to_string()])
    );
    assert!(result.text_content.contains("Inventory"));
}
