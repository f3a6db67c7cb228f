//! Speaker-turn chunking for the cleaner
//!
//! Transcripts are cleaned one chunk at a time. A chunk is a speaker turn
//! (one input line); any turn over the word threshold is subdivided at
//! sentence boundaries, each sub-chunk re-prefixed with the original
//! speaker label so the cleaning prompt always sees a labeled turn. A
//! sentence is never split unless it alone exceeds the threshold, in
//! which case it breaks at the nearest whitespace past the budget.

/// Maximum words per chunk handed to the cleaning model
pub const MAX_CHUNK_WORDS: usize = 500;

/// Split transcript lines into cleanable chunks
pub fn split_long_lines(lines: &[&str], max_words: usize) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| split_turn(line, max_words))
        .collect()
}

/// Split one speaker turn into chunks of at most `max_words` words
pub fn split_turn(line: &str, max_words: usize) -> Vec<String> {
    if word_count(line) <= max_words {
        return vec![line.to_string()];
    }

    let (prefix, content) = speaker_prefix(line)
        .map(|(prefix, rest)| (Some(prefix), rest))
        .unwrap_or((None, line));
    // The label counts against the chunk budget
    let prefix_words = prefix.map(word_count).unwrap_or(0);
    let budget = max_words.saturating_sub(prefix_words).max(1);

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0usize;

    let mut emit = |parts: &mut Vec<String>, words: &mut usize| {
        if parts.is_empty() {
            return;
        }
        let body = parts.join(" ");
        chunks.push(match prefix {
            Some(prefix) => format!("{prefix} {body}"),
            None => body,
        });
        parts.clear();
        *words = 0;
    };

    for sentence in split_sentences(content) {
        let sentence_words = word_count(&sentence);

        if sentence_words > budget {
            // A single oversized sentence: flush what we have, then break
            // the sentence itself at whitespace.
            emit(&mut current, &mut current_words);
            let words: Vec<&str> = sentence.split_whitespace().collect();
            for piece in words.chunks(budget) {
                let mut group = vec![piece.join(" ")];
                let mut group_words = word_count(&group[0]);
                emit(&mut group, &mut group_words);
            }
            continue;
        }

        if current_words + sentence_words > budget {
            emit(&mut current, &mut current_words);
        }
        current_words += sentence_words;
        current.push(sentence);
    }
    emit(&mut current, &mut current_words);

    chunks
}

/// Split `SPEAKER_<n>:` (or `SPEAKER_UNKNOWN:`) off the front of a line
fn speaker_prefix(line: &str) -> Option<(&str, &str)> {
    if !line.starts_with("SPEAKER_") {
        return None;
    }
    let colon = line.find(':')?;
    let (prefix, rest) = line.split_at(colon + 1);
    Some((prefix, rest.trim_start()))
}

/// Split text into sentences at `.`, `?`, `!`, keeping the terminator
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let bytes = text.as_bytes();

    let mut i = 0usize;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'?' | b'!') {
            // Absorb runs of terminators ("...", "?!")
            let mut end = i + 1;
            while end < bytes.len() && matches!(bytes[end], b'.' | b'?' | b'!') {
                end += 1;
            }
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
            i = end;
        } else {
            i += 1;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(words: usize) -> String {
        let mut s = vec!["word"; words].join(" ");
        s.push('.');
        s
    }

    #[test]
    fn short_turns_pass_through_unsplit() {
        let line = format!("SPEAKER_0: {}", sentence(100));
        let chunks = split_turn(&line, MAX_CHUNK_WORDS);
        assert_eq!(chunks, vec![line]);
    }

    #[test]
    fn turn_at_threshold_is_one_chunk() {
        // Exactly at the limit including the label word
        let line = format!("SPEAKER_0: {}", vec!["w"; MAX_CHUNK_WORDS - 1].join(" "));
        assert_eq!(word_count(&line), MAX_CHUNK_WORDS);
        assert_eq!(split_turn(&line, MAX_CHUNK_WORDS).len(), 1);
    }

    #[test]
    fn long_turns_split_at_sentence_boundaries() {
        let line = format!(
            "SPEAKER_1: {} {} {}",
            sentence(300),
            sentence(300),
            sentence(100)
        );
        let chunks = split_turn(&line, MAX_CHUNK_WORDS);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.starts_with("SPEAKER_1:"), "label lost: {chunk}");
            assert!(
                word_count(chunk) <= MAX_CHUNK_WORDS,
                "chunk exceeds threshold: {} words",
                word_count(chunk)
            );
            // Sentence boundaries respected: every chunk ends at a terminator
            assert!(chunk.trim_end().ends_with('.'));
        }
    }

    #[test]
    fn oversized_single_sentence_splits_at_whitespace() {
        let huge = vec!["word"; 1200].join(" ");
        let line = format!("SPEAKER_0: {huge}.");
        let chunks = split_turn(&line, MAX_CHUNK_WORDS);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.starts_with("SPEAKER_0:"));
            assert!(word_count(chunk) <= MAX_CHUNK_WORDS);
        }
    }

    #[test]
    fn every_subchunk_within_bound_for_mixed_input() {
        let lines_owned = vec![
            format!("SPEAKER_0: {}", sentence(10)),
            format!("SPEAKER_1: {} {}", sentence(400), sentence(400)),
            format!("SPEAKER_0: {}", sentence(520)),
        ];
        let lines: Vec<&str> = lines_owned.iter().map(String::as_str).collect();
        let chunks = split_long_lines(&lines, MAX_CHUNK_WORDS);
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(word_count(chunk) <= MAX_CHUNK_WORDS);
            assert!(chunk.starts_with("SPEAKER_"));
        }
    }

    #[test]
    fn empty_lines_dropped() {
        let chunks = split_long_lines(&["", "   ", "SPEAKER_0: Hi."], MAX_CHUNK_WORDS);
        assert_eq!(chunks, vec!["SPEAKER_0: Hi.".to_string()]);
    }

    #[test]
    fn sentence_splitter_keeps_terminators() {
        let sentences = split_sentences("One. Two? Three! Done");
        assert_eq!(sentences, vec!["One.", "Two?", "Three!", "Done"]);
    }

    #[test]
    fn terminator_runs_absorbed() {
        let sentences = split_sentences("Wait... really?! Yes.");
        assert_eq!(sentences, vec!["Wait...", "really?!", "Yes."]);
    }

    #[test]
    fn unlabeled_lines_still_split() {
        let line = format!("{} {}", sentence(300), sentence(300));
        let chunks = split_turn(&line, MAX_CHUNK_WORDS);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(word_count(chunk) <= MAX_CHUNK_WORDS);
        }
    }
}
