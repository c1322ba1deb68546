//! Structured variable extraction, independent of strategy classification.

use {
    nubi_common::{ExtractedVariables, MonetaryAmount, Sentiment, Urgency},
    nubi_policy::ExtractionPolicy,
    once_cell::sync::Lazy,
    regex::Regex,
};

use crate::mention::contains_whole_word;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"@([A-Za-z0-9_]{1,32})").expect("mention regex is valid")
});

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"https?://[^\s<>()]+").expect("url regex is valid")
});

/// `$12.50` and `$1,000` style amounts.
static DOLLAR_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\$\s?([0-9][0-9,_]*(?:\.[0-9]+)?)").expect("dollar regex is valid")
});

/// `0.5 SOL` / `100 usdc` style amounts with a trailing currency marker.
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)\b([0-9]+(?:\.[0-9]+)?)\s*(sol|btc|eth|usdc|usd|bonk|dollars?|bucks)\b")
        .expect("amount regex is valid")
});

/// Scan `text` for mentions, token symbols, monetary amounts, links,
/// sentiment, and urgency. Pure; never fails.
#[must_use]
pub fn extract(text: &str, policy: &ExtractionPolicy) -> ExtractedVariables {
    let lower = text.to_lowercase();
    ExtractedVariables {
        mentions: extract_mentions(text),
        token_symbols: extract_token_symbols(&lower, policy),
        monetary_amounts: extract_monetary_amounts(text),
        urls: extract_urls(text),
        sentiment: score_sentiment(&lower, policy),
        urgency: score_urgency(text, &lower, policy),
    }
}

fn extract_mentions(text: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for caps in MENTION_RE.captures_iter(text) {
        let name = caps[1].to_owned();
        if !mentions.contains(&name) {
            mentions.push(name);
        }
    }
    mentions
}

fn extract_token_symbols(lower: &str, policy: &ExtractionPolicy) -> Vec<String> {
    policy
        .token_symbols
        .iter()
        .filter(|symbol| contains_whole_word(lower, &symbol.to_lowercase()))
        .map(|symbol| symbol.to_uppercase())
        .collect()
}

fn extract_monetary_amounts(text: &str) -> Vec<MonetaryAmount> {
    let mut amounts = Vec::new();
    for caps in DOLLAR_RE.captures_iter(text) {
        if let Ok(value) = caps[1].replace([',', '_'], "").parse::<f64>() {
            amounts.push(MonetaryAmount {
                value,
                currency: "USD".to_owned(),
            });
        }
    }
    for caps in AMOUNT_RE.captures_iter(text) {
        if let Ok(value) = caps[1].parse::<f64>() {
            amounts.push(MonetaryAmount {
                value,
                currency: normalize_currency(&caps[2]),
            });
        }
    }
    amounts
}

fn normalize_currency(marker: &str) -> String {
    match marker.to_lowercase().as_str() {
        "dollar" | "dollars" | "bucks" | "usd" => "USD".to_owned(),
        other => other.to_uppercase(),
    }
}

fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', '!', '?']))
        .filter(|candidate| url::Url::parse(candidate).is_ok())
        .map(str::to_owned)
        .collect()
}

fn score_sentiment(lower: &str, policy: &ExtractionPolicy) -> Sentiment {
    let hits = |words: &[String]| {
        words
            .iter()
            .filter(|w| contains_whole_word(lower, &w.to_lowercase()))
            .count()
    };
    let positive = hits(&policy.positive_words);
    let negative = hits(&policy.negative_words);
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// Urgency heuristic: keyword hits weigh heaviest; shouting (exclamation
/// marks, high caps ratio) escalates one level.
fn score_urgency(text: &str, lower: &str, policy: &ExtractionPolicy) -> Urgency {
    let keyword_hits = policy
        .urgency_keywords
        .iter()
        .filter(|w| contains_whole_word(lower, &w.to_lowercase()))
        .count();

    let exclaims = text.chars().filter(|c| *c == '!').count() as u32;
    let shouting_punctuation = exclaims >= policy.exclaim_threshold.max(1);

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let caps_ratio = if letters.is_empty() {
        0.0
    } else {
        letters.iter().filter(|c| c.is_uppercase()).count() as f32 / letters.len() as f32
    };
    let shouting_caps = letters.len() >= 6 && caps_ratio >= policy.caps_ratio_threshold;

    let mut score = 2 * keyword_hits;
    if shouting_punctuation {
        score += 1;
    }
    if shouting_caps {
        score += 1;
    }

    match score {
        0 => Urgency::Low,
        1 | 2 => Urgency::Medium,
        _ => Urgency::High,
    }
}
