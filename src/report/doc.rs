//! Buffered page model and PDF output.
//!
//! The composer pushes draw operations into a [`Document`] while it lays out
//! sections; nothing is written to the PDF until `finish`, which runs the
//! footer-stamping pass over the buffered pages and renders the whole
//! document in one go. `finish` consumes the document, so no further
//! operations are possible on a closed report.

use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str};

use super::RenderedReport;

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 50.0;
/// Top of the content area; the layout cursor starts here on every page.
pub const CONTENT_TOP: f32 = PAGE_HEIGHT - MARGIN;
/// Content must stay above this line; the footer band sits below it.
pub const CONTENT_BOTTOM: f32 = 60.0;

const FOOTER_Y: f32 = 30.0;
const FOOTER_SIZE: f32 = 8.0;
const FOOTER_TEXT: &str = "Little Steps Pre-Primary School";

#[derive(Debug, Clone)]
pub enum Op {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    Rule {
        y: f32,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        pixel_width: u32,
        pixel_height: u32,
        encoding: ImageEncoding,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// Original JPEG bytes, embedded with a DCT filter.
    Jpeg,
    /// Raw 8-bit RGB samples, row-major.
    Rgb,
}

/// Rough width of Helvetica text; good enough for right-aligning footers.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

#[derive(Debug)]
pub struct Document {
    pages: Vec<Vec<Op>>,
    current: Vec<Op>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            pages: Vec::new(),
            current: Vec::new(),
        }
    }

    pub fn push(&mut self, op: Op) {
        self.current.push(op);
    }

    /// Close the current page and start a fresh one.
    pub fn page_break(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
    }

    /// Pages finalized so far plus the one being populated.
    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    /// Stamp footers onto every buffered page and render the PDF. A document
    /// that never received an operation still renders one (empty) page.
    pub fn finish(mut self) -> RenderedReport {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
        }
        stamp_footers(&mut self.pages);
        let bytes = render_pdf(&self.pages);
        RenderedReport {
            page_count: self.pages.len(),
            bytes,
        }
    }
}

fn stamp_footers(pages: &mut [Vec<Op>]) {
    let total = pages.len();
    for (i, page) in pages.iter_mut().enumerate() {
        page.push(Op::Rule { y: FOOTER_Y + 12.0 });
        page.push(Op::Text {
            x: MARGIN,
            y: FOOTER_Y,
            size: FOOTER_SIZE,
            bold: false,
            text: FOOTER_TEXT.to_string(),
        });
        let label = format!("Page {} of {}", i + 1, total);
        page.push(Op::Text {
            x: PAGE_WIDTH - MARGIN - text_width(&label, FOOTER_SIZE),
            y: FOOTER_Y,
            size: FOOTER_SIZE,
            bold: false,
            text: label,
        });
    }
}

fn render_pdf(pages: &[Vec<Op>]) -> Vec<u8> {
    let mut pdf = Pdf::new();

    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let font_id = Ref::new(3);
    let bold_font_id = Ref::new(4);
    let mut next_ref = 5;
    let mut alloc = move || {
        let r = Ref::new(next_ref);
        next_ref += 1;
        r
    };

    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.type1_font(font_id).base_font(Name(b"Helvetica"));
    pdf.type1_font(bold_font_id)
        .base_font(Name(b"Helvetica-Bold"));

    let mut page_ids = Vec::with_capacity(pages.len());

    for ops in pages {
        let page_id = alloc();
        let content_id = alloc();
        page_ids.push(page_id);

        // Image XObjects first; the page resources reference them by name.
        let mut images: Vec<(String, Ref)> = Vec::new();
        for op in ops {
            let Op::Image {
                pixel_width,
                pixel_height,
                encoding,
                data,
                ..
            } = op
            else {
                continue;
            };
            let image_id = alloc();
            let mut image = pdf.image_xobject(image_id, data);
            if *encoding == ImageEncoding::Jpeg {
                image.filter(Filter::DctDecode);
            }
            image.width(*pixel_width as i32);
            image.height(*pixel_height as i32);
            image.color_space().device_rgb();
            image.bits_per_component(8);
            image.finish();
            images.push((format!("Im{}", images.len()), image_id));
        }

        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
        page.parent(page_tree_id);
        page.contents(content_id);
        {
            let mut resources = page.resources();
            let mut fonts = resources.fonts();
            fonts.pair(Name(b"F1"), font_id);
            fonts.pair(Name(b"F2"), bold_font_id);
            fonts.finish();
            if !images.is_empty() {
                let mut x_objects = resources.x_objects();
                for (name, id) in &images {
                    x_objects.pair(Name(name.as_bytes()), *id);
                }
            }
        }
        page.finish();

        let mut content = Content::new();
        let mut image_idx = 0;
        for op in ops {
            match op {
                Op::Text {
                    x,
                    y,
                    size,
                    bold,
                    text,
                } => {
                    content.begin_text();
                    content.set_font(if *bold { Name(b"F2") } else { Name(b"F1") }, *size);
                    content.next_line(*x, *y);
                    content.show(Str(text.as_bytes()));
                    content.end_text();
                }
                Op::Rule { y } => {
                    content.set_line_width(0.5);
                    content.move_to(MARGIN, *y);
                    content.line_to(PAGE_WIDTH - MARGIN, *y);
                    content.stroke();
                }
                Op::Image {
                    x,
                    y,
                    width,
                    height,
                    ..
                } => {
                    let (name, _) = &images[image_idx];
                    image_idx += 1;
                    content.save_state();
                    content.transform([*width, 0.0, 0.0, *height, *x, *y]);
                    content.x_object(Name(name.as_bytes()));
                    content.restore_state();
                }
            }
        }
        pdf.stream(content_id, &content.finish());
    }

    pdf.pages(page_tree_id)
        .kids(page_ids.iter().copied())
        .count(pages.len() as i32);

    pdf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_ops(page: &[Op]) -> Vec<&str> {
        page.iter()
            .filter_map(|op| match op {
                Op::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn footers_number_every_page() {
        let mut pages: Vec<Vec<Op>> = vec![Vec::new(), Vec::new(), Vec::new()];
        stamp_footers(&mut pages);
        for (i, page) in pages.iter().enumerate() {
            let texts = text_ops(page);
            assert!(texts.contains(&FOOTER_TEXT));
            assert!(texts.contains(&format!("Page {} of 3", i + 1).as_str()));
        }
    }

    #[test]
    fn empty_document_renders_one_page() {
        let report = Document::new().finish();
        assert_eq!(report.page_count, 1);
        assert!(report.bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn page_break_starts_new_page() {
        let mut doc = Document::new();
        doc.push(Op::Text {
            x: MARGIN,
            y: CONTENT_TOP,
            size: 10.0,
            bold: false,
            text: "first".to_string(),
        });
        doc.page_break();
        doc.push(Op::Text {
            x: MARGIN,
            y: CONTENT_TOP,
            size: 10.0,
            bold: false,
            text: "second".to_string(),
        });
        assert_eq!(doc.page_count(), 2);
        let report = doc.finish();
        assert_eq!(report.page_count, 2);
        let raw = String::from_utf8_lossy(&report.bytes);
        assert!(raw.contains("Page 1 of 2"));
        assert!(raw.contains("Page 2 of 2"));
    }
}
