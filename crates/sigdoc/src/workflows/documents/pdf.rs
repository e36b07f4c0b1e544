use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::markers::extract_anchors;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const FONT_SIZE: i64 = 11;
const LEADING: i64 = 14;
const MAX_COLUMNS: usize = 72;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("header PDF not found at {}; place the cover page there first", .path.display())]
    HeaderMissing { path: PathBuf },
    #[error("could not read or write document: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("{0} PDF has no pages")]
    NoPages(&'static str),
    #[error("header page carries signature anchors: {}", .0.join(", "))]
    AnchorOnHeader(Vec<String>),
    #[error("unsupported document type '{0}'; upload a PDF or DOCX file")]
    UnsupportedFormat(String),
    #[error("{0} to PDF conversion is not available; upload a PDF or use a document template")]
    UnsupportedConversion(&'static str),
    #[error("PDF is missing its {0}")]
    Malformed(&'static str),
}

/// The standard cover page placed in front of every generated document.
#[derive(Debug, Clone)]
pub struct HeaderDocument {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl HeaderDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PdfError> {
        let path = path.as_ref().to_path_buf();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PdfError::HeaderMissing { path });
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_bytes(path, bytes)
    }

    pub fn from_bytes(path: PathBuf, bytes: Vec<u8>) -> Result<Self, PdfError> {
        let document = Document::load_mem(&bytes)?;
        if document.get_pages().is_empty() {
            return Err(PdfError::NoPages("header"));
        }
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 of the header file, hex encoded.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// Fails when the first page contains `{{DS:...}}` anchors. Pages whose
    /// text cannot be extracted are let through with a warning.
    pub fn ensure_no_anchors(&self) -> Result<(), PdfError> {
        let document = Document::load_mem(&self.bytes)?;
        let first = document
            .get_pages()
            .keys()
            .next()
            .copied()
            .ok_or(PdfError::NoPages("header"))?;

        let text = match document.extract_text(&[first]) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "header text extraction failed; anchor check skipped");
                return Ok(());
            }
        };

        if text.contains("{{DS:") {
            let mut names = extract_anchors(&text);
            if names.is_empty() {
                names.push("{{DS:".to_string());
            }
            return Err(PdfError::AnchorOnHeader(names));
        }
        Ok(())
    }
}

/// Kind of user-supplied document, decided from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Docx,
}

impl SourceFormat {
    const DOCX_MIME: &'static str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    pub fn detect(path: &Path) -> Result<Self, PdfError> {
        let guess = mime_guess::from_path(path).first();
        match guess {
            Some(mime) if mime == mime::APPLICATION_PDF => Ok(Self::Pdf),
            Some(mime) if mime.essence_str() == Self::DOCX_MIME => Ok(Self::Docx),
            Some(mime) => Err(PdfError::UnsupportedFormat(mime.essence_str().to_string())),
            None => Err(PdfError::UnsupportedFormat(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string()),
            )),
        }
    }
}

pub fn convert_docx_to_pdf(_docx: &[u8]) -> Result<Vec<u8>, PdfError> {
    Err(PdfError::UnsupportedConversion("DOCX"))
}

pub fn page_count(pdf: &[u8]) -> Result<usize, PdfError> {
    Ok(Document::load_mem(pdf)?.get_pages().len())
}

/// Places header page 1 in front of every page of `document`.
pub fn merge_header(header: &HeaderDocument, document: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut cover = Document::load_mem(header.bytes())?;
    let extra: Vec<u32> = cover.get_pages().keys().skip(1).copied().collect();
    if !extra.is_empty() {
        cover.delete_pages(&extra);
    }

    let body = Document::load_mem(document)?;
    if body.get_pages().is_empty() {
        return Err(PdfError::NoPages("document"));
    }

    let mut merged = concatenate(vec![cover, body])?;
    merged.prune_objects();
    merged.compress();
    save(&mut merged)
}

/// Shrinks a PDF for upload: unreferenced objects and empty streams are
/// dropped, objects renumbered and streams compressed.
pub fn optimize_for_esign(pdf: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut document = Document::load_mem(pdf)?;
    let before = pdf.len();
    document.delete_zero_length_streams();
    document.prune_objects();
    document.renumber_objects();
    document.compress();
    let optimized = save(&mut document)?;
    debug!(before, after = optimized.len(), "optimized PDF");
    Ok(optimized)
}

/// Lays plain text out on A4 pages in Courier.
/// Characters outside WinAnsi are drawn as '?' and logged.
pub fn render_text_document(title: &str, text: &str) -> Result<Vec<u8>, PdfError> {
    let unrenderable = unrenderable_chars(text);
    if !unrenderable.is_empty() {
        warn!(
            title,
            characters = %unrenderable.iter().collect::<String>(),
            "characters outside WinAnsi replaced with '?'"
        );
    }
    let lines = wrap_lines(text, MAX_COLUMNS);
    let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
    let mut chunks: Vec<&[String]> = lines.chunks(lines_per_page).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(FONT_SIZE)]),
            Operation::new("TL", vec![Object::Integer(LEADING)]),
            Operation::new(
                "Td",
                vec![
                    Object::Integer(MARGIN),
                    Object::Integer(PAGE_HEIGHT - MARGIN),
                ],
            ),
        ];
        for line in chunk {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(win_ansi(line))],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations }.encode()?;
        let content_id = document.add_object(Stream::new(dictionary! {}, content));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = document.add_object(dictionary! {
        "Title" => Object::string_literal(win_ansi(title)),
        "Producer" => Object::string_literal("sigdoc"),
    });
    document.trailer.set("Root", catalog_id);
    document.trailer.set("Info", info_id);
    document.compress();

    save(&mut document)
}

fn save(document: &mut Document) -> Result<Vec<u8>, PdfError> {
    let mut buffer = Vec::new();
    document.save_to(&mut buffer)?;
    Ok(buffer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Catalog,
    Pages,
    Page,
    Outline,
    Other,
}

fn node_kind(object: &Object) -> NodeKind {
    let name = object
        .as_dict()
        .and_then(|dict| dict.get(b"Type"))
        .and_then(Object::as_name);
    match name {
        Ok(name) if name == b"Catalog" => NodeKind::Catalog,
        Ok(name) if name == b"Pages" => NodeKind::Pages,
        Ok(name) if name == b"Page" => NodeKind::Page,
        Ok(name) if name == b"Outlines" || name == b"Outline" => NodeKind::Outline,
        _ => NodeKind::Other,
    }
}

/// Copies inherited attributes down onto the page so it survives being
/// re-parented under a new page tree.
fn flattened_page(document: &Document, page_id: ObjectId) -> Result<Dictionary, PdfError> {
    let mut page = document.get_object(page_id)?.as_dict()?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        if depth > 32 {
            break;
        }
        let node = document.get_object(parent_id)?.as_dict()?;
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    Ok(page)
}

/// Joins documents page-wise, keeping the first document's catalog.
fn concatenate(documents: Vec<Document>) -> Result<Document, PdfError> {
    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut document in documents {
        document.renumber_objects_with(next_id);
        next_id = document.max_id + 1;

        for page_id in document.get_pages().into_values() {
            pages.push((page_id, flattened_page(&document, page_id)?));
        }
        objects.extend(document.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut pages_id: Option<ObjectId> = None;

    for (object_id, object) in objects {
        match node_kind(&object) {
            NodeKind::Catalog => {
                if catalog.is_none() {
                    catalog = Some((object_id, object.as_dict()?.clone()));
                }
            }
            NodeKind::Pages => {
                if pages_id.is_none() {
                    pages_id = Some(object_id);
                }
            }
            NodeKind::Page | NodeKind::Outline => {}
            NodeKind::Other => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (catalog_id, mut catalog) = catalog.ok_or(PdfError::Malformed("document catalog"))?;
    let pages_id = pages_id.ok_or(PdfError::Malformed("page tree"))?;

    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let mut tree = Dictionary::new();
    tree.set("Type", Object::Name(b"Pages".to_vec()));
    tree.set("Count", Object::Integer(kids.len() as i64));
    tree.set("Kids", kids);
    merged.objects.insert(pages_id, Object::Dictionary(tree));

    catalog.set("Pages", pages_id);
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.trailer.set("Root", catalog_id);

    merged.max_id = merged
        .objects
        .keys()
        .map(|(id, _)| *id)
        .max()
        .unwrap_or(0);
    merged.renumber_objects();

    Ok(merged)
}

/// WinAnsi byte for `c`, including the 0x80-0x9F punctuation block.
fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        '\t' => b' ',
        ' '..='~' | '\u{a0}'..='\u{ff}' => u32::from(c) as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

/// Characters the Courier/WinAnsi font cannot draw, in first-seen order.
pub fn unrenderable_chars(text: &str) -> Vec<char> {
    let mut missing: Vec<char> = Vec::new();
    for c in text.chars() {
        if c != '\n' && c != '\r' && win_ansi_byte(c).is_none() && !missing.contains(&c) {
            missing.push(c);
        }
    }
    missing
}

fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| win_ansi_byte(c).unwrap_or(b'?'))
        .collect()
}

fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let raw = raw.trim_end();
        if raw.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let current_len = current.chars().count();
            if !current.is_empty() && current_len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}
