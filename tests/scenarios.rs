//! End-to-end scenarios across the codec, ingestion and normalization.

use drawkit::dsl::{self, CompressOptions, CompressedDocument};
use drawkit::element::Element;
use drawkit::normalize::{Normalizer, Theme};
use drawkit::stream::{IngestOptions, RecordError, StreamIngestor, ingest};
use serde_json::json;

fn elements(value: serde_json::Value) -> Vec<Element> {
    serde_json::from_value(value).unwrap()
}

fn find<'a>(elements: &'a [Element], id: &str) -> &'a Element {
    elements.iter().find(|e| e.id == id).unwrap()
}

#[test]
fn minimal_round_trip_keeps_bindings_and_factors_stroke() {
    let source = elements(json!([
        {"id": "A", "type": "rectangle", "x": 0, "y": 0, "width": 100, "height": 60, "strokeColor": "#1e1e1e",
         "boundElements": [{"id": "arrow-1", "type": "arrow"}]},
        {"id": "B", "type": "rectangle", "x": 300, "y": 0, "width": 100, "height": 60, "strokeColor": "#1e1e1e",
         "boundElements": [{"id": "arrow-1", "type": "arrow"}]},
        {"id": "arrow-1", "type": "arrow", "x": 100, "y": 30, "width": 200, "height": 0, "strokeColor": "#1e1e1e",
         "points": [[0, 0], [200, 0]],
         "startBinding": {"elementId": "A", "focus": 0, "gap": 1},
         "endBinding": {"elementId": "B", "focus": 0, "gap": 1}}
    ]));

    let compressed = dsl::compress(&source, &CompressOptions::default()).unwrap();
    assert_eq!(compressed.document.common_attributes.get("strokeColor"), Some(&json!("#1e1e1e")));

    let restored = dsl::decompress(&compressed.text, &compressed.document).unwrap();
    assert_eq!(restored.elements, source);
    let linear = find(&restored.elements, "arrow-1").kind.linear().unwrap();
    assert_eq!(linear.start_binding.as_ref().unwrap().element_id, "A");
    assert_eq!(linear.end_binding.as_ref().unwrap().element_id, "B");
}

#[test]
fn round_trip_survives_document_persistence() {
    let source = elements(json!([
        {"id": "r", "type": "rectangle", "x": 0, "y": 0, "width": 10, "height": 10, "boundElements": [{"id": "t", "type": "text"}]},
        {"id": "t", "type": "text", "x": 1, "y": 1, "width": 8, "height": 8, "text": "two words", "containerId": "r"}
    ]));
    let compressed = dsl::compress(&source, &CompressOptions::default()).unwrap();

    let stored = serde_json::to_string(&compressed.document).unwrap();
    let reference: CompressedDocument = serde_json::from_str(&stored).unwrap();
    let restored = dsl::decompress(&compressed.text, &reference).unwrap();
    assert_eq!(restored.elements, source);
}

#[test]
fn streaming_split_emits_once_and_advances_the_watermark() {
    let mut buffer = String::from(r#"{"id":"a","type":"rectangle","x":1"#);
    let options = IngestOptions::raw(0);

    let first = ingest(&buffer, 0, &options);
    assert!(first.elements.is_empty() && first.errors.is_empty());
    assert_eq!(first.remaining, buffer);

    buffer.push_str(r#","y":2,"width":1,"height":1}"#);
    let second = ingest(&buffer, first.watermark, &options);
    assert_eq!(second.elements.len(), 1);
    assert_eq!(second.watermark, buffer.len());

    let third = ingest(&buffer, second.watermark, &options);
    assert!(third.elements.is_empty());
}

#[test]
fn malformed_record_is_isolated() {
    let buffer = concat!(
        r#"{"id":"ok","type":"rectangle","x":0,"y":0,"width":10,"height":10}"#,
        "\n",
        r#"{"id":"bad","type":"text","x":0,"y":0,"text":"he said "no""}"#,
        "\n",
    );
    let result = ingest(buffer, 0, &IngestOptions::default());

    assert_eq!(result.elements.len(), 1);
    assert_eq!(result.elements[0].id, "ok");
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0].error, RecordError::Json(_) | RecordError::Malformed));
}

#[test]
fn arrow_near_two_shapes_is_auto_bound() {
    let batch = elements(json!([
        {"id": "left", "type": "rectangle", "x": 0, "y": 0, "width": 100, "height": 100},
        {"id": "right", "type": "ellipse", "x": 400, "y": 0, "width": 100, "height": 100},
        {"id": "arrow", "type": "arrow", "x": 130, "y": 50, "points": [[0, 0], [240, 0]]}
    ]));
    let out = Normalizer::default().normalize(batch);

    let linear = find(&out, "arrow").kind.linear().unwrap();
    assert_eq!(linear.start_binding.as_ref().unwrap().element_id, "left");
    assert_eq!(linear.end_binding.as_ref().unwrap().element_id, "right");
}

#[test]
fn chunked_ingestion_matches_a_single_pass() {
    let transcript = [
        r#"{"id":"a","type":"rectangle","x":0,"y":0,"width":80,"height":40}"#,
        r#"{"id":"b","type":"diamond","x":200,"y":0,"width":80,"height":40}"#,
        r#"{"id":"c","type":"text","x":10,"y":10,"text":"über → 世界"}"#,
        r#"{"id":"d","type":"line","x":0,"y":100,"points":[[0,0],[50,0]]}"#,
    ]
    .join("\n");

    let single = ingest(&transcript, 0, &IngestOptions::raw(1));
    for size in [1, 3, 16, 100] {
        let mut ingestor = StreamIngestor::new(IngestOptions::raw(1));
        let mut collected = Vec::new();
        let mut pending = transcript.as_str();
        while !pending.is_empty() {
            let mut end = size.min(pending.len());
            while !pending.is_char_boundary(end) {
                end += 1;
            }
            let (chunk, rest) = pending.split_at(end);
            collected.extend(ingestor.push(chunk).elements);
            pending = rest;
        }
        assert_eq!(collected, single.elements, "chunk size {size}");
    }
}

#[test]
fn normalization_is_idempotent_on_ingested_text() {
    let transcript = concat!(
        r#"{"id":"box","type":"rectangle","x":0,"y":0,"width":120,"height":60,"label":"Start"}"#,
        "\n",
        r#"{"id":"next","type":"ellipse","x":300,"y":0,"width":120,"height":60}"#,
        "\n",
        r#"{"id":"go","type":"arrow","x":125,"y":30,"points":[[0,0],[170,0]]}"#,
        "\n",
    );
    let normalizer = Normalizer::new(Theme { dark: true, preferred_stroke: None });
    let result = ingest(transcript, 0, &IngestOptions { updated_at: 0, normalizer: Some(normalizer.clone()) });

    assert_eq!(result.elements.len(), 4);
    assert_eq!(normalizer.normalize(result.elements.clone()), result.elements);
}

#[test]
fn explicit_nulls_survive_json_round_trip() {
    let input = json!([
        {"id": "r", "type": "rectangle", "x": 0.0, "y": 0.0, "width": 100.0, "height": 60.0, "boundElements": null},
        {"id": "t", "type": "text", "x": 10.0, "y": 10.0, "width": 40.0, "height": 20.0, "text": "hi",
         "containerId": null},
        {"id": "go", "type": "arrow", "x": 100.0, "y": 30.0, "width": 50.0, "height": 0.0,
         "points": [[0.0, 0.0], [50.0, 0.0]], "startBinding": null, "endBinding": null,
         "startArrowhead": null, "endArrowhead": "arrow"}
    ]);
    let source = elements(input.clone());

    let compressed = dsl::compress(&source, &CompressOptions::default()).unwrap();
    let restored = dsl::decompress(&compressed.text, &compressed.document).unwrap();
    assert_eq!(serde_json::to_value(&restored.elements).unwrap(), input);
}

#[test]
fn chunked_normalized_ingestion_matches_a_single_pass() {
    let transcript = concat!(
        "Drawing it now.\n",
        r#"{"id":"box","type":"rectangle","x":0,"y":0,"width":120,"height":60,"label":"Start"}"#,
        "\n",
        r#"{"id":"next","type":"ellipse","x":300,"y":0,"width":120,"height":60}"#,
        "\n",
        r#"{"id":"go","type":"arrow","x":125,"y":30,"points":[[0,0],[170,0]]}"#,
        "\n",
    );
    let options = IngestOptions { updated_at: 0, normalizer: Some(Normalizer::new(Theme { dark: true, preferred_stroke: None })) };
    let single = ingest(transcript, 0, &options);
    assert_eq!(single.elements.len(), 4);

    for size in [1, 7, 50, 90] {
        let mut ingestor = StreamIngestor::new(options.clone());
        let mut collected: Vec<Element> = Vec::new();
        for chunk in transcript.as_bytes().chunks(size) {
            let result = ingestor.push(std::str::from_utf8(chunk).unwrap());
            for changed in result.updated {
                let slot = collected.iter_mut().find(|e| e.id == changed.id).unwrap();
                *slot = changed;
            }
            collected.extend(result.elements);
        }
        assert_eq!(collected, single.elements, "chunk size {size}");
    }
}
