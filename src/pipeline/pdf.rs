//! PDF primitives on top of `lopdf`: load, count pages, extract text, and
//! build new documents (reflowed text, single image, notice page, merge).
//!
//! Every function here is synchronous and CPU-bound. Callers on the async
//! side run them inside `tokio::task::spawn_blocking`.
//!
//! Generated text uses the standard Type 1 Helvetica font with
//! `WinAnsiEncoding`, so no font program is embedded. Characters outside
//! Latin-1 are written as `?`.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// US Letter, in points.
pub const LETTER: (f32, f32) = (612.0, 792.0);

/// Layout for reflowed text pages.
#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub leading: f32,
    /// Characters per line before wrapping.
    pub wrap_column: usize,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_width: LETTER.0,
            page_height: LETTER.1,
            margin: 72.0,
            font_size: 12.0,
            leading: 14.4,
            wrap_column: 80,
        }
    }
}

impl TextLayout {
    pub fn lines_per_page(&self) -> usize {
        let usable = self.page_height - 2.0 * self.margin;
        ((usable / self.leading).floor() as usize).max(1)
    }
}

/// A positioned line of text on a fixed-layout page.
#[derive(Debug, Clone)]
pub struct TextRun<'a> {
    pub text: &'a str,
    pub size: f32,
    pub x: f32,
    pub y: f32,
}

/// Decoded image ready for embedding as a DCT (JPEG) XObject.
#[derive(Debug, Clone)]
pub struct JpegImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Parse a PDF from memory, decrypting empty-password documents.
pub fn load(bytes: &[u8]) -> Result<Document, String> {
    let mut doc = Document::load_mem(bytes).map_err(|e| e.to_string())?;
    if doc.is_encrypted() {
        doc.decrypt("")
            .map_err(|_| "document is encrypted with a non-empty password".to_string())?;
    }
    Ok(doc)
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Text of each page, in page order. A page whose text cannot be decoded
/// yields an empty string rather than failing the whole document.
pub fn extract_pages_text(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|&n| match doc.extract_text(&[n]) {
            Ok(t) => t,
            Err(e) => {
                debug!(page = n, error = %e, "Page text extraction failed");
                String::new()
            }
        })
        .collect()
}

/// Concatenated text of every page. Fails when no page decodes at all.
pub fn extract_all_text(doc: &Document) -> Result<String, String> {
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err("document has no pages".to_string());
    }
    doc.extract_text(&pages).map_err(|e| e.to_string())
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Encode a string for a WinAnsi Helvetica `Tj` operand.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap at `column` characters. Words longer than a line are split.
pub fn wrap_line(line: &str, column: usize) -> Vec<String> {
    let column = column.max(1);
    let mut out = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > column {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let split: String = word.chars().take(column).collect();
            word = word.chars().skip(column).collect();
            out.push(split);
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > column && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

fn helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

fn text_ops(runs: &[TextRun<'_>]) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(runs.len() * 4);
    for run in runs {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec!["F1".into(), run.size.into()]));
        ops.push(Operation::new("Td", vec![run.x.into(), run.y.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(run.text))],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

/// Assemble a document from per-page content streams sharing one resource dict.
fn assemble(
    mut doc: Document,
    pages_id: ObjectId,
    resources_id: ObjectId,
    pages: Vec<((f32, f32), Vec<Operation>)>,
) -> Result<Vec<u8>, String> {
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for ((w, h), operations) in pages {
        let content = Content { operations };
        let encoded = content.encode().map_err(|e| e.to_string())?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    save(&mut doc)
}

fn save(doc: &mut Document) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| e.to_string())?;
    Ok(out)
}

/// Lay paragraphs out as wrapped, paginated Helvetica text.
///
/// Empty paragraphs become blank lines. Always produces at least one page.
pub fn build_text_pdf(paragraphs: &[String], layout: &TextLayout) -> Result<Vec<u8>, String> {
    let mut lines: Vec<String> = Vec::new();
    for p in paragraphs {
        if p.trim().is_empty() {
            lines.push(String::new());
        } else {
            for raw in p.lines() {
                lines.extend(wrap_line(raw, layout.wrap_column));
            }
        }
    }

    let per_page = layout.lines_per_page();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(per_page).collect()
    };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let top = layout.page_height - layout.margin - layout.font_size;
    let pages = chunks
        .into_iter()
        .map(|chunk| {
            let runs: Vec<TextRun<'_>> = chunk
                .iter()
                .enumerate()
                .filter(|(_, l)| !l.is_empty())
                .map(|(i, l)| TextRun {
                    text: l,
                    size: layout.font_size,
                    x: layout.margin,
                    y: top - i as f32 * layout.leading,
                })
                .collect();
            ((layout.page_width, layout.page_height), text_ops(&runs))
        })
        .collect();

    assemble(doc, pages_id, resources_id, pages)
}

/// One fixed-layout page with explicitly positioned runs.
pub fn build_notice_pdf(size: (f32, f32), runs: &[TextRun<'_>]) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    assemble(doc, pages_id, resources_id, vec![(size, text_ops(runs))])
}

/// One page sized to the image plus `margin` on every side.
pub fn build_image_pdf(image: &JpegImage, margin: u32) -> Result<Vec<u8>, String> {
    let (w, h) = (image.width as f32, image.height as f32);
    let m = margin as f32;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        image.data.clone(),
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im1" => image_id },
    });

    let ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![w.into(), 0.into(), 0.into(), h.into(), m.into(), m.into()],
        ),
        Operation::new("Do", vec!["Im1".into()]),
        Operation::new("Q", vec![]),
    ];

    assemble(doc, pages_id, resources_id, vec![((w + 2.0 * m, h + 2.0 * m), ops)])
}

// ── Merge ────────────────────────────────────────────────────────────────────

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: &[&[u8]] = &[b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

fn type_name(obj: &Object) -> Option<&[u8]> {
    let dict = match obj {
        Object::Dictionary(d) => d,
        Object::Stream(s) => &s.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        if depth > 64 {
            break;
        }
        let node = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(v) = node.get(key) {
            return Some(v.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    None
}

/// Concatenate the pages of every input, in input order, into one document.
///
/// Each page is re-parented under a single flat page tree; inherited
/// attributes are copied onto the page first so nothing is lost.
pub fn merge(inputs: &[&[u8]]) -> Result<Vec<u8>, String> {
    let mut next_id: u32 = 1;
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();

    for (i, bytes) in inputs.iter().enumerate() {
        let mut doc = load(bytes).map_err(|e| format!("input {}: {e}", i + 1))?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let mut dict = doc
                .get_object(page_id)
                .and_then(Object::as_dict)
                .map_err(|e| format!("input {}: bad page object: {e}", i + 1))?
                .clone();
            for key in INHERITABLE {
                if !dict.has(key) {
                    if let Some(v) = inherited(&doc, &dict, key) {
                        dict.set(key.to_vec(), v);
                    }
                }
            }
            pages.push((page_id, dict));
        }

        for (id, obj) in doc.objects {
            match type_name(&obj) {
                Some(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline") => {}
                _ => {
                    objects.insert(id, obj);
                }
            }
        }
    }

    if pages.is_empty() {
        return Err("inputs contain no pages".to_string());
    }

    let pages_id: ObjectId = (next_id, 0);
    let catalog_id: ObjectId = (next_id + 1, 0);

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;

    let mut kids = Vec::with_capacity(pages.len());
    for (id, mut dict) in pages {
        dict.set("Parent", pages_id);
        merged.objects.insert(id, Object::Dictionary(dict));
        kids.push(Object::Reference(id));
    }
    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    merged.trailer.set("Root", catalog_id);
    merged.max_id = catalog_id.0;
    merged.renumber_objects();

    save(&mut merged)
}
