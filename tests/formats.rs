//! Integration tests for multi-format loading: PDF pages, Word documents
//! and slide decks end up in the index with page-aware chunk ids, and a
//! corrupt file is skipped without failing the folder.

use std::fs;
use std::io::Write;
use std::sync::Arc;

use tempfile::TempDir;

use docsync::chunk::ChunkParams;
use docsync::embedding::NoopProvider;
use docsync::loader::DocumentLoader;
use docsync::reconcile::{source_key, IndexReconciler};
use docsync::store::memory::InMemoryIndexStore;
use docsync::store::IndexStore;

/// Minimal one-page PDF showing `phrase`. Builds the body first, then an
/// xref table with the real byte offsets so the parser accepts it.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >> stream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    zip_with(&[(
        "word/document.xml",
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        ),
    )])
}

fn minimal_pptx(slides: &[&str]) -> Vec<u8> {
    let entries: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<?xml version=\"1.0\"?><p:sld xmlns:p=\"p\" xmlns:a=\"a\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                    text
                ),
            )
        })
        .collect();
    let refs: Vec<(&str, String)> = entries
        .iter()
        .map(|(n, b)| (n.as_str(), b.clone()))
        .collect();
    zip_with(&refs)
}

#[test]
fn pdf_text_is_extracted_per_page() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("report.pdf");
    fs::write(&path, minimal_pdf("quarterly revenue summary")).unwrap();

    let segments = DocumentLoader::new().load(&path).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].page, 0);
    assert!(segments[0].text.contains("quarterly revenue summary"));
}

#[test]
fn slides_become_pages_in_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("deck.pptx");
    fs::write(&path, minimal_pptx(&["intro slide", "results slide"])).unwrap();

    let segments = DocumentLoader::new().load(&path).unwrap();
    let pages: Vec<u32> = segments.iter().map(|s| s.page).collect();
    assert_eq!(pages, vec![0, 1]);
    assert!(segments[0].text.contains("intro slide"));
    assert!(segments[1].text.contains("results slide"));
}

#[tokio::test]
async fn mixed_folder_is_indexed_with_page_ids() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("report.pdf"), minimal_pdf("pdf body text")).unwrap();
    fs::write(
        dir.join("memo.docx"),
        minimal_docx(&["first paragraph", "second paragraph"]),
    )
    .unwrap();
    fs::write(dir.join("deck.pptx"), minimal_pptx(&["one", "two"])).unwrap();
    fs::write(dir.join("broken.pdf"), b"not a pdf").unwrap();

    let store = Arc::new(InMemoryIndexStore::new());
    let reconciler = IndexReconciler::new(
        store.clone(),
        Arc::new(NoopProvider::with_dims(4)),
        ChunkParams::default(),
    );
    let report = reconciler.full(dir).await.unwrap();
    assert_eq!(report.files_loaded, 3);
    assert_eq!(report.files_skipped, 1);

    let deck = source_key(&dir.join("deck.pptx"));
    let slide_two = store.get(&format!("{}:1:0", deck)).unwrap();
    assert_eq!(slide_two.metadata.page, 1);
    assert!(slide_two.text.contains("two"));

    let memo = store
        .get(&format!("{}:0:0", source_key(&dir.join("memo.docx"))))
        .unwrap();
    assert!(memo.text.contains("first paragraph\nsecond paragraph"));

    let pdf = store
        .get(&format!("{}:0:0", source_key(&dir.join("report.pdf"))))
        .unwrap();
    assert!(pdf.text.contains("pdf body text"));

    assert_eq!(store.count().await.unwrap(), 4);
}
