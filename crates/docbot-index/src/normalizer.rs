//! Rule-based cleanup for text extracted from court documents.
//!
//! The rules are heuristics tuned for Brazilian appellate PDFs: they strip
//! letterheads, process numbers, citation noise and acronym runs so the
//! remaining prose embeds well. The output is not a normal form; running it
//! twice may remove a little more.

use std::sync::LazyLock;

use regex::Regex;

/// Lines shorter than this (after trimming) are dropped at the end.
const MIN_LINE_CHARS: usize = 20;

static SUBSTITUTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // escape codes left over from RTF-ish sources
        (r"\\[a-z0-9]{1,5}", " "),
        (r"[•\u{2022}\u{25cf}\u{25cb}\u{25aa}\u{25a0}]", "- "),
        (r"[\u{201c}\u{201d}]", "\""),
        (r"[\u{2018}\u{2019}]", "'"),
        // court boilerplate
        (r"\(e-STJ Fl\.[0-9]+\)", ""),
        (r"R\. BELA CINTRA, 772[^\n]+", ""),
        (r"\([^)]*\d+/\d+[^)]*\)", ""),
        (r"TEL \([0-9 ]+\)[^\n]*", ""),
        (r"[0-9]{7}\.[Vv][0-9]{3} [0-9]+/[0-9]+", ""),
        (r"Documento recebido eletronicamente da origem", ""),
        (r"SV/AO ALVES DE OLIVEIRA & SALLES VANNI SOCIEDADE DE ADVOGADOS", ""),
        // headers and footers
        (r"Poder Judici[^\n]+TRIBUNAL[^\n]+", ""),
        (r"RECURSO ESPECIAL[^\n]+", ""),
        (r"RECURSO EXTRAORDIN[^\n]+", ""),
        (r"AGRAVO[^\n]+", ""),
        (r"HABEAS CORPUS[^\n]+", ""),
        // page markers
        (r"\b\d+/\d+\b", ""),
        (r"\bp\. \d+\b", ""),
        // recurring legal terms
        (r"\bIn verbis\b:", ""),
        (r"\bEMENTA\b", ""),
        (r"\bRel(ator)?\b\.?(\sMini?s?t?[^\n.]*)?", ""),
        (r"\bDJe\b[^,\n.]*", ""),
        // short citations
        (r"\([^)]{1,5}\)", ""),
        (r"\[[^\]]+\]", ""),
        // dates and process codes
        (r"\b\d{2}/\d{2}/\d{4}\b", ""),
        (r"\b\d{4}\.\d{2}\.\d{2}\.\d{6}\b", ""),
        // acronym runs, then isolated acronyms
        (r"([A-Z]{2,}(\.|\s|/)){2,}", ""),
        (r"\b[A-Z]{2,}\b", ""),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| compile(pattern).map(|re| (re, replacement)))
    .collect()
});

static LEADING_SYMBOL: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"^[\d\W]"));

static POST_FILTER: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"Erro:[^\n]+", ""),
        (r"Aviso:[^\n]+", ""),
        (r"\s+", " "),
        (r"\.{2,}", "."),
        (r"\s+\.", "."),
        (r"\s+,", ","),
        (r"([.?!] )", "$1\n"),
        (r"\n\s*\n+", "\n\n"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| compile(pattern).map(|re| (re, replacement)))
    .collect()
});

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid normalizer pattern");
            None
        }
    }
}

/// Cleans raw extracted text. Pure and infallible.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.to_string();
    for (re, replacement) in SUBSTITUTIONS.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }

    // Numbered items, bullets and stray symbols rarely carry prose.
    if let Some(leading) = LEADING_SYMBOL.as_ref() {
        text = text
            .split('\n')
            .filter(|line| !leading.is_match(line.trim()))
            .collect::<Vec<_>>()
            .join("\n");
    }

    for (re, replacement) in POST_FILTER.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }

    text.split('\n')
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.is_empty() || trimmed.chars().count() >= MIN_LINE_CHARS
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
