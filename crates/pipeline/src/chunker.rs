//! Utterance chunker
//!
//! Splits assistant text into ordered fragments sized for the synthesis
//! loop: sentence boundaries at `.`, `!`, `?`, and `;`, word-bounded
//! subdivision of long sentences, and greedy first-chunk buffering so the
//! opening fragment carries as much speech as its hard limit allows.
//!
//! Abbreviation-internal periods (`Mr.`, `D.C.`, ...) are masked before
//! splitting and restored afterwards, so they never act as boundaries.

use avatar_gateway_config::ChunkerConfig;

/// Private-use stand-in for a protected trailing period.
const MASK: char = '\u{F8FF}';

/// Split `text` into ordered utterance fragments.
///
/// Every fragment at index >= 1 is at most `max_chars` long; fragment 0 is
/// at most `first_chunk_hard_limit`. Joining the fragments with single
/// spaces reproduces the whitespace-normalized input. The one exception to
/// the caps is a single word longer than the cap, which is emitted alone
/// rather than split mid-word.
pub fn split(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let masked = mask_abbreviations(&normalized, &config.abbreviations);

    let mut fragments = Vec::new();
    for sentence in split_sentences(&masked) {
        if sentence.chars().count() <= config.max_chars {
            fragments.push(sentence);
        } else {
            fragments.extend(subdivide(&sentence, config.max_chars));
        }
    }

    let fragments = buffer_first_chunk(fragments, config.first_chunk_hard_limit);

    fragments
        .into_iter()
        .map(|f| f.replace(MASK, "."))
        .collect()
}

/// Collapse all whitespace runs to single spaces, preserving casing and
/// punctuation.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn mask_abbreviations(text: &str, abbreviations: &[String]) -> String {
    let mut masked = text.to_string();
    // Longest first so e.g. "Mrs." is handled before any shorter overlap.
    let mut abbrs: Vec<&String> = abbreviations.iter().collect();
    abbrs.sort_by_key(|a| std::cmp::Reverse(a.len()));

    for abbr in abbrs {
        if let Some(head) = abbr.strip_suffix('.') {
            let replacement = format!("{head}{MASK}");
            masked = masked.replace(abbr.as_str(), &replacement);
        }
    }
    masked
}

/// Split at every `.`, `!`, `?`, or `;` followed by whitespace or
/// end-of-string. The punctuation stays with the preceding fragment.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    for i in 0..chars.len() {
        let (idx, c) = chars[i];
        if matches!(c, '.' | '!' | '?' | ';') {
            let at_boundary = chars
                .get(i + 1)
                .map_or(true, |&(_, next)| next.is_whitespace());
            if at_boundary {
                let end = idx + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Break one over-long sentence at word boundaries into pieces of at most
/// `max_chars`, never inside a word.
fn subdivide(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for word in sentence.split_whitespace() {
        let word_chars = word.chars().count();
        let combined = if current_chars == 0 {
            word_chars
        } else {
            current_chars + 1 + word_chars
        };

        if current_chars > 0 && combined > max_chars {
            pieces.push(std::mem::take(&mut current));
            current.push_str(word);
            current_chars = word_chars;
        } else {
            if current_chars > 0 {
                current.push(' ');
            }
            current.push_str(word);
            current_chars = combined;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Greedily merge leading fragments into fragment 0 while the combined
/// length stays within `hard_limit`.
///
/// Two stop conditions: the next fragment would overflow the limit, or
/// fragment 0 ends with a semicolon. Semicolon boundaries are hard; the
/// text after one always begins its own fragment.
fn buffer_first_chunk(fragments: Vec<String>, hard_limit: usize) -> Vec<String> {
    let mut iter = fragments.into_iter();
    let Some(mut first) = iter.next() else {
        return Vec::new();
    };
    let mut first_chars = first.chars().count();
    let mut rest = Vec::new();
    let mut merging = true;

    for fragment in iter {
        if merging {
            if first.ends_with(';') {
                merging = false;
            } else {
                let fragment_chars = fragment.chars().count();
                if first_chars + 1 + fragment_chars <= hard_limit {
                    first.push(' ');
                    first.push_str(&fragment);
                    first_chars += 1 + fragment_chars;
                    continue;
                }
                merging = false;
            }
        }
        rest.push(fragment);
    }

    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(first);
    out.extend(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkerConfig {
        ChunkerConfig::default()
    }

    fn assert_totality(input: &str) {
        let fragments = split(input, &config());
        assert_eq!(fragments.join(" "), normalize_whitespace(input));
    }

    #[test]
    fn test_empty_input() {
        assert!(split("", &config()).is_empty());
        assert!(split("   \n\t ", &config()).is_empty());
    }

    #[test]
    fn test_short_text_single_fragment() {
        let fragments = split("Hello there.", &config());
        assert_eq!(fragments, vec!["Hello there."]);
    }

    #[test]
    fn test_two_sentences_buffer_into_first_chunk() {
        // Both sentences fit the first-chunk budget, so buffering merges
        // them into one fragment.
        let fragments = split("Hi there. How are you?", &config());
        assert_eq!(fragments, vec!["Hi there. How are you?"]);
        assert!(fragments[0].chars().count() <= 125);
    }

    #[test]
    fn test_length_caps() {
        let text = "This sentence is deliberately written to run on and on so that it \
                    comfortably exceeds the one hundred and twenty character cap and must \
                    be subdivided at word boundaries. A second sentence follows it here. \
                    And then yet another one arrives to pad things out even further. \
                    Finally the paragraph closes with one more statement for good measure.";
        let fragments = split(text, &config());
        assert!(fragments.len() >= 2);
        for (i, fragment) in fragments.iter().enumerate() {
            let cap = if i == 0 { 125 } else { 120 };
            assert!(
                fragment.chars().count() <= cap,
                "fragment {i} over cap: {fragment:?}"
            );
        }
    }

    #[test]
    fn test_totality_round_trip() {
        for input in [
            "Hi there. How are you?",
            "Mr. Smith went to D.C.; he liked it.",
            "One!  Two?   Three; four.",
            "A sentence without terminal punctuation",
            "This sentence is deliberately written to run on and on so that it \
             comfortably exceeds the one hundred and twenty character cap and must \
             be subdivided at word boundaries without dropping anything at all.",
        ] {
            assert_totality(input);
        }
    }

    #[test]
    fn test_semicolon_is_a_boundary() {
        let fragments = split("First part; second part.", &config());
        assert_eq!(fragments, vec!["First part;", "second part."]);
    }

    #[test]
    fn test_semicolon_without_space_is_not_a_boundary() {
        let fragments = split("a;b stays together.", &config());
        assert_eq!(fragments, vec!["a;b stays together."]);
    }

    #[test]
    fn test_abbreviations_not_split() {
        let fragments = split("Mr. Smith went to D.C.; he liked it.", &config());
        assert_eq!(
            fragments,
            vec!["Mr. Smith went to D.C.;", "he liked it."]
        );
        for fragment in &fragments {
            assert!(!fragment.ends_with("Mr"));
            assert!(!fragment.ends_with("D.C") || fragment.ends_with("D.C."));
        }
    }

    #[test]
    fn test_sentence_ending_in_abbreviation_not_split() {
        let fragments = split("He moved to D.C. last year and loves it there", &config());
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn test_exclamation_and_question_boundaries() {
        // Fragment 0 is near the hard limit, so nothing merges into it.
        let first = format!("{}!", "a".repeat(110));
        let text = format!("{first} Right you are? Absolutely.");
        let fragments = split(&text, &config());
        assert_eq!(fragments, vec![first, "Right you are?".to_string(), "Absolutely.".to_string()]);
    }

    #[test]
    fn test_consecutive_punctuation_stays_with_fragment() {
        let fragments = split("Wait?! Really.", &config());
        assert_eq!(fragments, vec!["Wait?! Really."]);
    }

    #[test]
    fn test_long_paragraph_with_semicolons() {
        // 400-ish chars, three periods, two semicolons: >= 4 fragments, all
        // semicolons terminate fragments.
        let text = "The gateway accepts a short voice clip and answers with a stream of \
                    little video clips; each one arrives while the next is still being \
                    rendered on the accelerator. The first clip is kept deliberately small \
                    so the avatar starts talking quickly; later clips can afford to be \
                    longer because playback is already underway. The effect is a \
                    conversation that feels live rather than batch processed.";
        let fragments = split(text, &config());
        assert!(fragments.len() >= 4, "got {}: {fragments:?}", fragments.len());
        for (i, fragment) in fragments.iter().enumerate() {
            let cap = if i == 0 { 125 } else { 120 };
            assert!(fragment.chars().count() <= cap);
        }
        // every semicolon in the output sits at a fragment end
        for fragment in &fragments {
            if let Some(pos) = fragment.find(';') {
                assert_eq!(pos, fragment.len() - 1, "interior semicolon in {fragment:?}");
            }
        }
        assert_totality(text);
    }

    #[test]
    fn test_first_chunk_merge_stops_at_hard_limit() {
        // Three sentences of ~60 chars each: the first two merge (about
        // 120 chars), the third would overflow 125 and stays separate.
        let text = "This first sentence has been padded to about sixty characters. \
                    This second sentence has also been padded out to match it. \
                    This third sentence must therefore start the second fragment.";
        let fragments = split(text, &config());
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].chars().count() <= 125);
        assert!(fragments[0].contains("second sentence"));
        assert!(fragments[1].starts_with("This third sentence"));
    }

    #[test]
    fn test_no_merge_past_semicolon() {
        let fragments = split("Short start; and a short continuation.", &config());
        assert_eq!(
            fragments,
            vec!["Short start;", "and a short continuation."]
        );
    }

    #[test]
    fn test_oversized_word_emitted_whole() {
        let long_word = "x".repeat(140);
        let text = format!("Tiny intro then {long_word} and a tail that keeps going.");
        let fragments = split(&text, &config());
        assert!(fragments.iter().any(|f| f.contains(&long_word)));
        assert_totality(&text);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let text = "The gateway accepts a short voice clip and answers with a stream of \
                    little video clips; each one arrives while the next is still being \
                    rendered. The first clip is kept small so the avatar starts quickly.";
        let first = split(text, &config());
        let rejoined = first.join(" ");
        let second = split(&rejoined, &config());
        assert_eq!(first, second);
    }

    #[test]
    fn test_order_preserved() {
        let text = "Alpha comes first. Beta comes second; gamma comes third. Delta ends it.";
        let fragments = split(text, &config());
        let joined = fragments.join(" ");
        let positions: Vec<usize> = ["Alpha", "Beta", "gamma", "Delta"]
            .iter()
            .map(|w| joined.find(w).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
