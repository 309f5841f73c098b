//! The default analyzer bound to every new index.
//!
//! Text is segmented on Unicode word boundaries with every CJK ideograph
//! emitted as its own token, then passed through possessive stripping,
//! lowercasing and English stop-word removal.

use tantivy::tokenizer::{
    Language,
    LowerCaser,
    StopWordFilter,
    TextAnalyzer,
    Token,
    TokenFilter,
    TokenStream,
    Tokenizer,
};
use unicode_segmentation::{UnicodeSegmentation, UnicodeWordIndices};

/// Name the analyzer is registered under.
pub const DEFAULT_ANALYZER: &str = "cjk";

pub fn default_analyzer() -> TextAnalyzer {
    let builder = TextAnalyzer::builder(CjkTokenizer::default())
        .filter(PossessiveFilter)
        .filter(LowerCaser);
    match StopWordFilter::new(Language::English) {
        Some(stop_words) => builder.filter(stop_words).build(),
        None => builder.build(),
    }
}

/// Segments text into words, splitting runs of ideographs into single
/// characters.
#[derive(Clone, Default)]
pub struct CjkTokenizer {
    token: Token,
}

pub struct CjkTokenStream<'a> {
    text: &'a str,
    words: UnicodeWordIndices<'a>,
    pending: Option<(usize, &'a str)>,
    token: &'a mut Token,
}

impl Tokenizer for CjkTokenizer {
    type TokenStream<'a> = CjkTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> CjkTokenStream<'a> {
        self.token.reset();
        CjkTokenStream {
            text,
            words: text.unicode_word_indices(),
            pending: None,
            token: &mut self.token,
        }
    }
}

impl CjkTokenStream<'_> {
    fn emit(&mut self, offset: usize, len: usize) {
        self.token.text.clear();
        self.token.text.push_str(&self.text[offset..offset + len]);
        self.token.offset_from = offset;
        self.token.offset_to = offset + len;
        self.token.position = self.token.position.wrapping_add(1);
    }
}

impl TokenStream for CjkTokenStream<'_> {
    fn advance(&mut self) -> bool {
        loop {
            if let Some((offset, rest)) = self.pending.take() {
                let Some(first) = rest.chars().next() else {
                    continue;
                };
                let len = if is_cjk(first) {
                    first.len_utf8()
                } else {
                    rest.find(is_cjk).unwrap_or(rest.len())
                };
                if len < rest.len() {
                    self.pending = Some((offset + len, &rest[len..]));
                }
                self.emit(offset, len);
                return true;
            }

            let Some((offset, word)) = self.words.next() else {
                return false;
            };
            self.pending = Some((offset, word));
        }
    }

    fn token(&self) -> &Token {
        self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        self.token
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}')
}

/// Strips English possessive suffixes (`'s`, `’s`, trailing apostrophe).
#[derive(Clone, Copy)]
pub struct PossessiveFilter;

impl TokenFilter for PossessiveFilter {
    type Tokenizer<T: Tokenizer> = PossessiveFilterWrapper<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> PossessiveFilterWrapper<T> {
        PossessiveFilterWrapper(tokenizer)
    }
}

#[derive(Clone)]
pub struct PossessiveFilterWrapper<T>(T);

impl<T: Tokenizer> Tokenizer for PossessiveFilterWrapper<T> {
    type TokenStream<'a> = PossessiveTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        PossessiveTokenStream {
            tail: self.0.token_stream(text),
        }
    }
}

pub struct PossessiveTokenStream<T> {
    tail: T,
}

impl<T: TokenStream> TokenStream for PossessiveTokenStream<T> {
    fn advance(&mut self) -> bool {
        if !self.tail.advance() {
            return false;
        }
        strip_possessive(&mut self.tail.token_mut().text);
        true
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}

fn strip_possessive(text: &mut String) {
    for suffix in ["'s", "\u{2019}s", "'S", "\u{2019}S", "'", "\u{2019}"] {
        if text.len() > suffix.len() && text.ends_with(suffix) {
            text.truncate(text.len() - suffix.len());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        let mut analyzer = default_analyzer();
        let mut stream = analyzer.token_stream(text);
        let mut out = Vec::new();
        while stream.advance() {
            out.push(stream.token().text.clone());
        }
        out
    }

    #[test]
    fn lowercases_and_drops_stop_words() {
        assert_eq!(tokens("The Quick brown FOX"), ["quick", "brown", "fox"]);
    }

    #[test]
    fn strips_possessives() {
        assert_eq!(tokens("John's book"), ["john", "book"]);
        assert_eq!(tokens("Mary\u{2019}s"), ["mary"]);
    }

    #[test]
    fn splits_ideographs() {
        assert_eq!(tokens("全文检索"), ["全", "文", "检", "索"]);
    }

    #[test]
    fn mixed_scripts_keep_offsets() {
        let mut tokenizer = CjkTokenizer::default();
        let mut stream = tokenizer.token_stream("rust编程");
        let mut seen = Vec::new();
        while stream.advance() {
            let t = stream.token();
            seen.push((t.text.clone(), t.offset_from, t.offset_to, t.position));
        }
        assert_eq!(
            seen,
            [
                ("rust".to_string(), 0, 4, 0),
                ("编".to_string(), 4, 7, 1),
                ("程".to_string(), 7, 10, 2),
            ]
        );
    }
}
