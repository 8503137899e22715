use std::panic::{self, AssertUnwindSafe};

use crate::study::{SourceText, StudyError, StudyResult};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Where the learner's material comes from.
#[derive(Debug, Clone)]
pub enum TextSource {
    Pasted(String),
    Document { file_name: String, bytes: Vec<u8> },
}

impl TextSource {
    pub fn is_pdf_name(file_name: &str) -> bool {
        file_name.to_ascii_lowercase().ends_with(".pdf")
    }

    /// Pasted text wins when both are present and the paste is not blank.
    pub fn pick(pasted: Option<String>, document: Option<(String, Vec<u8>)>) -> StudyResult<Self> {
        match (pasted, document) {
            (Some(text), _) if !text.trim().is_empty() => Ok(TextSource::Pasted(text)),
            (_, Some((file_name, bytes))) => Ok(TextSource::Document { file_name, bytes }),
            _ => Err(StudyError::Input(
                "Please paste some text or upload a PDF first.".to_string(),
            )),
        }
    }

    /// Blocking: PDF extraction is CPU work, callers on the runtime should use `spawn_blocking`.
    pub fn into_source_text(self) -> StudyResult<SourceText> {
        match self {
            TextSource::Pasted(text) => SourceText::new(text),
            TextSource::Document { file_name, bytes } => {
                let text = extract_pdf_text(&file_name, &bytes)?;
                SourceText::new(text).map_err(|_| {
                    StudyError::Input(format!(
                        "I couldn't find any text in {}. Scanned or image-only PDFs don't work, try pasting the text instead.",
                        file_name
                    ))
                })
            }
        }
    }
}

/// Text of every page, in order, one newline between pages.
///
/// A page that fails to extract contributes an empty string; the rest of the
/// document is still read.
pub fn extract_pdf_text(file_name: &str, bytes: &[u8]) -> StudyResult<String> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(StudyError::Input(format!(
            "{} doesn't look like a PDF. Please upload a PDF or paste the text.",
            file_name
        )));
    }

    let mut doc = pdf_extract::Document::load_mem(bytes).map_err(|err| {
        log::warn!("PDF parsing failed for {}: {}", file_name, err);
        StudyError::Input(format!(
            "I couldn't read {}. Please try another PDF or paste the text.",
            file_name
        ))
    })?;
    if doc.is_encrypted() {
        doc.decrypt("").map_err(|err| {
            log::warn!("Could not decrypt {}: {}", file_name, err);
            StudyError::Input(format!(
                "{} is password-protected. Please upload an unlocked copy or paste the text.",
                file_name
            ))
        })?;
    }

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let pages = collect_pages(file_name, page_numbers, |page_num| {
        let mut text = String::new();
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut output = pdf_extract::PlainTextOutput::new(&mut text);
            pdf_extract::output_doc_page(&doc, &mut output, page_num)
        }));
        match extracted {
            Ok(Ok(())) => Ok(text),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("extractor panicked".to_string()),
        }
    });

    log::info!("Extracted {} pages from {}", pages.len(), file_name);

    Ok(join_pages(pages))
}

fn collect_pages<F>(file_name: &str, page_numbers: Vec<u32>, mut extract_page: F) -> Vec<String>
where
    F: FnMut(u32) -> Result<String, String>,
{
    page_numbers
        .into_iter()
        .map(|page_num| {
            extract_page(page_num).unwrap_or_else(|err| {
                log::warn!("Skipping page {} of {}: {}", page_num, file_name, err);
                String::new()
            })
        })
        .collect()
}

fn join_pages(pages: Vec<String>) -> String {
    pages.join("\n").trim().to_string()
}
