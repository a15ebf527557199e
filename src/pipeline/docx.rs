//! Minimal WordprocessingML: write paragraphs into a `.docx`, read paragraphs
//! back out of one.
//!
//! The writer produces the smallest package Word and LibreOffice accept:
//! `[Content_Types].xml`, `_rels/.rels`, and `word/document.xml`. The reader
//! only looks at `word/document.xml` and recovers paragraph text, tabs and
//! line breaks; styling is ignored. Both directions go through [`quick_xml`],
//! so entity and character references round-trip.

use std::io::{Cursor, Read, Write};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_TAIL: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440"/></w:sectPr></w:body></w:document>"#;

/// One block of the generated document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(String),
    PageBreak,
}

/// Escape the five XML special characters and drop characters XML 1.0 forbids.
pub fn escape_xml(text: &str) -> String {
    let allowed: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || (c as u32) >= 0x20)
        .collect();
    quick_xml::escape::escape(allowed.as_str()).into_owned()
}

fn document_xml(blocks: &[Block]) -> String {
    let mut xml = String::from(DOCUMENT_HEAD);
    for block in blocks {
        match block {
            Block::Paragraph(text) => {
                // An empty run keeps blank lines visible in Word.
                let text = if text.is_empty() { " " } else { text.as_str() };
                xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
                xml.push_str(&escape_xml(text));
                xml.push_str("</w:t></w:r></w:p>");
            }
            Block::PageBreak => {
                xml.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
            }
        }
    }
    xml.push_str(DOCUMENT_TAIL);
    xml
}

/// Package `blocks` as a `.docx` byte buffer.
pub fn write_docx(blocks: &[Block]) -> Result<Vec<u8>, String> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/document.xml", document_xml(blocks)),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts).map_err(|e| e.to_string())?;
        zip.write_all(body.as_bytes()).map_err(|e| e.to_string())?;
    }

    let cursor = zip.finish().map_err(|e| e.to_string())?;
    Ok(cursor.into_inner())
}

/// Lay out extracted page texts as one paragraph per line, with a page break
/// between pages.
pub fn blocks_from_pages<S: AsRef<str>>(pages: &[S]) -> Vec<Block> {
    let mut blocks = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            blocks.push(Block::PageBreak);
        }
        blocks.extend(page.as_ref().lines().map(|l| Block::Paragraph(l.to_string())));
    }
    blocks
}

/// Paragraph texts of a `.docx`, in document order.
///
/// Text comes from `w:t` runs; `w:tab` and `w:br` inside a run become `\t`
/// and `\n`. Tab stops declared in paragraph properties are not runs and
/// are skipped.
pub fn read_paragraphs(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a DOCX package: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing word/document.xml: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable word/document.xml: {e}"))?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_run = false;
    let mut in_text = false;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("malformed word/document.xml at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_text = in_run,
                b"w:tab" if in_run => current.push('\t'),
                b"w:br" if in_run => current.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" if in_run => current.push('\t'),
                b"w:br" if in_run => current.push('\n'),
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| format!("bad text in word/document.xml: {e}"))?;
                current.push_str(&text);
            }
            Event::CData(c) if in_text => current.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:r" => in_run = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}
