//! Lemmatization behind a swappable trait
//!
//! `RuleLemmatizer` is a small English lemmatizer: an irregular-form table
//! followed by inflectional suffix rules. When built with a dictionary (the
//! catalog's surface forms) it prefers candidates that are real entries, which
//! is what matching needs: variants map back to the catalog form and unrelated
//! words do not.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Maps a lowercase token to its canonical dictionary form
pub trait Lemmatize: Send + Sync {
    fn lemmatize(&self, token: &str) -> String;
}

static IRREGULAR: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("was", "be"), ("were", "be"), ("is", "be"), ("are", "be"), ("am", "be"),
        ("been", "be"), ("being", "be"), ("has", "have"), ("had", "have"),
        ("did", "do"), ("does", "do"), ("done", "do"),
        ("went", "go"), ("gone", "go"), ("goes", "go"),
        ("threw", "throw"), ("thrown", "throw"),
        ("ate", "eat"), ("eaten", "eat"), ("began", "begin"), ("begun", "begin"),
        ("bore", "bear"), ("borne", "bear"), ("broke", "break"), ("broken", "break"),
        ("brought", "bring"), ("built", "build"), ("bought", "buy"), ("caught", "catch"),
        ("chose", "choose"), ("chosen", "choose"), ("came", "come"), ("dealt", "deal"),
        ("drew", "draw"), ("drawn", "draw"), ("drove", "drive"), ("driven", "drive"),
        ("fell", "fall"), ("fallen", "fall"), ("felt", "feel"), ("fought", "fight"),
        ("found", "find"), ("flew", "fly"), ("flown", "fly"), ("forgot", "forget"),
        ("forgotten", "forget"), ("forgave", "forgive"), ("forgiven", "forgive"),
        ("froze", "freeze"), ("frozen", "freeze"), ("gave", "give"), ("given", "give"),
        ("got", "get"), ("gotten", "get"), ("grew", "grow"), ("grown", "grow"),
        ("held", "hold"), ("hid", "hide"), ("hidden", "hide"), ("kept", "keep"),
        ("knew", "know"), ("known", "know"), ("laid", "lay"), ("led", "lead"),
        ("left", "leave"), ("lent", "lend"), ("lay", "lie"), ("lain", "lie"),
        ("lost", "lose"), ("made", "make"), ("meant", "mean"), ("met", "meet"),
        ("paid", "pay"), ("ran", "run"), ("rang", "ring"), ("rung", "ring"),
        ("rose", "rise"), ("risen", "rise"), ("rode", "ride"), ("ridden", "ride"),
        ("said", "say"), ("saw", "see"), ("seen", "see"), ("sought", "seek"),
        ("sold", "sell"), ("sent", "send"), ("shook", "shake"), ("shaken", "shake"),
        ("shone", "shine"), ("shot", "shoot"), ("sang", "sing"), ("sung", "sing"),
        ("sank", "sink"), ("sunk", "sink"), ("sat", "sit"), ("slept", "sleep"),
        ("spoke", "speak"), ("spoken", "speak"), ("spent", "spend"), ("stood", "stand"),
        ("stole", "steal"), ("stolen", "steal"), ("struck", "strike"), ("strove", "strive"),
        ("striven", "strive"), ("swore", "swear"), ("sworn", "swear"), ("swam", "swim"),
        ("swum", "swim"), ("took", "take"), ("taken", "take"), ("taught", "teach"),
        ("tore", "tear"), ("torn", "tear"), ("told", "tell"), ("thought", "think"),
        ("understood", "understand"), ("woke", "wake"), ("woken", "wake"),
        ("wore", "wear"), ("worn", "wear"), ("won", "win"), ("wrote", "write"),
        ("written", "write"), ("withdrew", "withdraw"), ("withdrawn", "withdraw"),
        ("children", "child"), ("men", "man"), ("women", "woman"), ("mice", "mouse"),
        ("feet", "foot"), ("teeth", "tooth"), ("geese", "goose"), ("oxen", "ox"),
        ("criteria", "criterion"), ("phenomena", "phenomenon"), ("analyses", "analysis"),
        ("hypotheses", "hypothesis"), ("theses", "thesis"), ("crises", "crisis"),
    ]
    .into_iter()
    .collect()
});

/// Rule-based English lemmatizer, optionally dictionary-aware
#[derive(Debug, Clone, Default)]
pub struct RuleLemmatizer {
    dictionary: HashSet<String>,
}

impl RuleLemmatizer {
    /// Lemmatizer without a dictionary; returns the first plausible stem
    pub fn new() -> Self {
        Self::default()
    }

    /// Lemmatizer that prefers candidates found in `forms`
    pub fn with_dictionary<I, S>(forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dictionary: forms.into_iter().map(Into::into).collect(),
        }
    }

    fn in_dictionary(&self, word: &str) -> bool {
        self.dictionary.contains(word)
    }
}

impl Lemmatize for RuleLemmatizer {
    fn lemmatize(&self, token: &str) -> String {
        let token = token.to_lowercase();

        if self.in_dictionary(&token) {
            return token;
        }
        if let Some(base) = IRREGULAR.get(token.as_str()) {
            return (*base).to_string();
        }

        let candidates = suffix_candidates(&token);
        if !self.dictionary.is_empty() {
            if let Some(hit) = candidates.iter().find(|c| self.in_dictionary(c)) {
                return hit.clone();
            }
        }
        candidates.into_iter().next().unwrap_or(token)
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// `stopp` -> `stop`, but `fall`, `pass`, `buzz` stay as they are
fn undouble(stem: &str) -> Option<String> {
    let chars: Vec<char> = stem.chars().collect();
    let n = chars.len();
    if n >= 3 && chars[n - 1] == chars[n - 2] && !is_vowel(chars[n - 1]) {
        if matches!(chars[n - 1], 'l' | 's' | 'z' | 'f') {
            return None;
        }
        return Some(chars[..n - 1].iter().collect());
    }
    None
}

/// Consonant-vowel-consonant ending, which usually dropped a silent `e`
fn wants_e(stem: &str) -> bool {
    let chars: Vec<char> = stem.chars().collect();
    let n = chars.len();
    if n < 2 {
        return false;
    }
    let last = chars[n - 1];
    let prev = chars[n - 2];
    if is_vowel(last) || matches!(last, 'w' | 'x' | 'y') {
        return false;
    }
    if matches!(last, 'c' | 'g' | 'v' | 'z' | 's') && !is_vowel(prev) {
        // "danc", "charg", "solv", "collaps"
        return true;
    }
    n >= 3 && is_vowel(prev) && !is_vowel(chars[n - 3])
}

/// Ordered lemma candidates for an inflected token, most likely first
fn suffix_candidates(token: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: String| {
        if s.len() >= 2 && !out.contains(&s) {
            out.push(s);
        }
    };

    if let Some(stem) = token.strip_suffix("ies") {
        if stem.len() >= 2 {
            push(format!("{}y", stem));
        }
    }
    if let Some(stem) = token.strip_suffix("ied") {
        if stem.len() >= 2 {
            push(format!("{}y", stem));
        }
    }
    if let Some(stem) = token.strip_suffix("ves") {
        push(format!("{}f", stem));
        push(format!("{}fe", stem));
    }

    if let Some(stem) = token.strip_suffix("ing") {
        if stem.len() >= 2 {
            if let Some(single) = undouble(stem) {
                push(single);
            }
            if wants_e(stem) {
                push(format!("{}e", stem));
                push(stem.to_string());
            } else {
                push(stem.to_string());
                push(format!("{}e", stem));
            }
        }
    }

    if let Some(stem) = token.strip_suffix("ed") {
        if stem.len() >= 2 {
            if let Some(single) = undouble(stem) {
                push(single);
            }
            if wants_e(stem) {
                push(format!("{}e", stem));
                push(stem.to_string());
            } else {
                push(stem.to_string());
                push(format!("{}e", stem));
            }
        }
    }

    if let Some(stem) = token.strip_suffix("iest") {
        push(format!("{}y", stem));
    }
    if let Some(stem) = token.strip_suffix("ier") {
        push(format!("{}y", stem));
    }
    for suffix in ["est", "er"] {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.len() >= 3 {
                if let Some(single) = undouble(stem) {
                    push(single);
                }
                push(stem.to_string());
                push(format!("{}e", stem));
            }
        }
    }

    if token.ends_with("sses")
        || token.ends_with("xes")
        || token.ends_with("ches")
        || token.ends_with("shes")
        || token.ends_with("zes")
        || token.ends_with("oes")
    {
        push(token[..token.len() - 2].to_string());
    }
    if token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
        && token.len() > 3
    {
        push(token[..token.len() - 1].to_string());
    }

    out
}
