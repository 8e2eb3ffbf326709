/// Words per chunk used by the index builder.
pub const DEFAULT_CHUNK_WORDS: usize = 800;

/// Splits `text` into consecutive chunks of at most `max_words`
/// whitespace-separated words, re-joined with single spaces.
///
/// Returns an empty vec when the text has no words.
pub fn chunk_words(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words)
        .map(|chunk| chunk.join(" "))
        .collect()
}
