//! Stand-in Poppler and Tesseract executables for exercising the extraction chain.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use lopdf::{Document, Object, Stream, dictionary};

/// Readable tender prose, well above the default quality threshold.
pub const PROSE: &str = "Le présent règlement de consultation précise les modalités de remise \
    des offres, les critères de jugement retenus par le maître d'ouvrage et la durée \
    prévisionnelle des travaux.";

/// Symbol soup that scores near zero.
pub const NOISE: &str = "~~ ]] [[ ## $$ @@ ** ^^ || ~~ ]] [[";

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// `pdftoppm` copying a small PNG for every page of the requested range.
///
/// Each call appends `DPI FIRST LAST PREFIX` to `pdftoppm.log` in `dir`.
pub fn fake_pdftoppm(dir: &Path) -> PathBuf {
    let source = dir.join("source.png");
    GrayImage::from_fn(16, 16, |x, _| Luma([(x * 16) as u8]))
        .save(&source)
        .unwrap();
    let log = dir.join("pdftoppm.log");
    let body = format!(
        "# -png -r DPI -f FIRST -l LAST PDF PREFIX\n\
         echo \"$3 $5 $7 $(basename \"$9\")\" >> '{log}'\n\
         page=$5\n\
         while [ \"$page\" -le \"$7\" ]; do\n\
         cp '{source}' \"$9-$page.png\"\n\
         page=$((page + 1))\n\
         done",
        log = log.display(),
        source = source.display(),
    );
    write_script(dir, "pdftoppm", &body)
}

/// Lines logged by [`fake_pdftoppm`].
pub fn pdftoppm_calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("pdftoppm.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// `tesseract` printing the text of the first shell pattern matching the image path.
///
/// Images matching no pattern produce empty output.
pub fn fake_tesseract(dir: &Path, answers: &[(&str, &str)]) -> PathBuf {
    let mut arms = String::new();
    for (index, (pattern, text)) in answers.iter().enumerate() {
        let answer = dir.join(format!("answer-{index}.txt"));
        fs::write(&answer, text).unwrap();
        arms.push_str(&format!("  {pattern}) cat '{}' ;;\n", answer.display()));
    }
    write_script(dir, "tesseract", &format!("case \"$1\" in\n{arms}esac"))
}

/// `pdftotext` printing `pages` separated and terminated by form feeds.
pub fn fake_pdftotext(dir: &Path, pages: &[&str]) -> PathBuf {
    let output = dir.join("pdftotext.out");
    let text: String = pages.iter().map(|page| format!("{page}\u{000C}")).collect();
    fs::write(&output, text).unwrap();
    write_script(dir, "pdftotext", &format!("cat '{}'", output.display()))
}

/// Valid PDF with `pages` blank pages and no text layer.
pub fn blank_pdf(path: &Path, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages);
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
