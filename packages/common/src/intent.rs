//! Image-request intent detection.
//!
//! Detection is an ordered table of `(locale, pattern)` rules evaluated
//! top to bottom; the first match wins. Prompt extraction runs per-locale
//! extractors in order and falls back to a trigger-word heuristic.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Fr,
    Ar,
    Ro,
    Es,
    De,
}

/// A message classified as a request to generate an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIntent {
    /// Locale of the detection rule that matched.
    pub locale: Locale,
    /// Text to send to the image model.
    pub prompt: String,
}

struct DetectionRule {
    locale: Locale,
    pattern: Regex,
}

struct PromptExtractor {
    gate: Regex,
    strips: Vec<Regex>,
}

fn ci(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("intent patterns are valid regexes")
}

const DETECTION_TABLE: &[(Locale, &[&str])] = &[
    (
        Locale::En,
        &[
            r"(generate|create|make|draw) (an |a |)image",
            r"show (me |)(an |a |)image",
            r"visualize",
            r"picture of",
            r"image of",
            r"illustration of",
            r"can you (generate|create|make|draw)",
        ],
    ),
    (
        Locale::Fr,
        &[
            r"(génère|générer|crée|créer|créé) (une |)image",
            r"dessine(r|)",
            r"montre(-moi|)",
            r"faire (une |)image",
            r"visualise(r|)",
            r"image de",
            r"illustrations? de",
            r"(peux-tu|pouvez-vous) (générer|génère|créer|dessiner|faire)",
        ],
    ),
    (
        Locale::Ar,
        &[
            r"إنشاء صورة",
            r"توليد صورة",
            r"رسم صورة",
            r"أظهر (لي |)صورة",
            r"اصنع (لي |)صورة",
            r"صورة (ل|من|عن)",
            r"تصور",
            r"رسم توضيحي",
            r"هل يمكنك (إنشاء|توليد|رسم)",
        ],
    ),
    (
        Locale::Ro,
        &[
            r"(generează|creează|desenează) (o |un |)imagine",
            r"arată(-mi|)",
            r"face (o |un |)imagine",
            r"vizualizează",
            r"(poză|imagine|ilustrație) (cu|de|despre)",
            r"poți (să |)(generezi|creezi|desenezi)",
        ],
    ),
    (
        Locale::Es,
        &[
            r"(genera|generar|crea|crear|dibuja|dibujar|muestra|muéstrame|muestrame|hace|hacer) (una |un |)imagen",
            r"visualiza(r|)",
            r"imagen de",
            r"ilustración de",
            r"puedes (generar|crear|dibujar)",
        ],
    ),
    (
        Locale::De,
        &[
            r"(generiere|erstelle|zeichne|mache) (ein |eine |)bild",
            r"zeige (mir |)(ein |eine |)bild",
            r"visualisiere",
            r"bild von",
            r"illustration von",
            r"kannst du (generieren|erstellen|zeichnen)",
        ],
    ),
];

static DETECTION_RULES: LazyLock<Vec<DetectionRule>> = LazyLock::new(|| {
    DETECTION_TABLE
        .iter()
        .flat_map(|(locale, patterns)| {
            patterns.iter().map(|p| DetectionRule {
                locale: *locale,
                pattern: ci(p),
            })
        })
        .collect()
});

/// Builds a gated extractor from a request prefix, a verb group, an article
/// group, the noun for "image" and the prepositions that may follow it.
/// `preps` carries its own trailing separator.
fn extractor(prefix: &str, verbs: &str, article: &str, noun: &str, preps: &str) -> PromptExtractor {
    let lead = format!(r"^{prefix}{verbs} {article}{noun}");
    PromptExtractor {
        gate: ci(&lead),
        strips: vec![
            ci(&format!(r"{lead} {preps}")),
            ci(&format!(r"{lead} ")),
            ci(&format!(r"^{prefix}{verbs} ")),
            ci(&format!(r"^{article}{noun} {preps}")),
        ],
    }
}

static EXTRACTORS: LazyLock<Vec<PromptExtractor>> = LazyLock::new(|| {
    vec![
        extractor(
            r"(please |can you |could you |)",
            r"(generate|create|make|draw|show me|visualize)",
            r"(an |a |)",
            r"image",
            r"(of|showing|with|that depicts|that shows|about|based on|featuring) ",
        ),
        extractor(
            r"(s'il te plaît |s'il vous plaît |peux-tu |pouvez-vous |)",
            r"(génère|générer|crée|créer|dessine|dessiner|montre-moi|visualise|visualiser|faire)",
            r"(une |)",
            r"image",
            r"(de |d'|montrant |avec |qui montre |sur |représentant )",
        ),
        extractor(
            r"(من فضلك |هل يمكنك |)",
            r"(أنشئ|إنشاء|ولد|توليد|ارسم|رسم|أظهر لي|اصنع لي|اصنع)",
            r"",
            r"صورة",
            r"(من |عن |تظهر |توضح |لـ ?|ل ?)",
        ),
        extractor(
            r"(te rog |poți să |poti sa |)",
            r"(generează|genereaza|creează|creeaza|desenează|deseneaza|arată-mi|arata-mi|vizualizează)",
            r"(o |un |)",
            r"(imagine|poză|poza)",
            r"(cu|de|despre|care arată|reprezentând) ",
        ),
    ]
});

static TRIGGER_WORD: LazyLock<Regex> =
    LazyLock::new(|| ci(r"\b(imagine|imagen|image|bild|صورة)\b"));

static LEADING_PREPOSITION: LazyLock<Regex> = LazyLock::new(|| ci(r"^(of|de|cu|von|من|ل)\s"));

/// Classify a user message, returning the extracted prompt when it asks for an image.
pub fn classify(text: &str) -> Option<ImageIntent> {
    DETECTION_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(text))
        .map(|rule| ImageIntent {
            locale: rule.locale,
            prompt: extract_prompt(text),
        })
}

pub fn is_image_request(text: &str) -> bool {
    classify(text).is_some()
}

/// Strip the request phrasing from `text`, leaving the image description.
pub fn extract_prompt(text: &str) -> String {
    let text = text.trim();

    for candidate in EXTRACTORS.iter() {
        if !candidate.gate.is_match(text) {
            continue;
        }
        let stripped = candidate
            .strips
            .iter()
            .fold(text.to_string(), |acc, strip| {
                strip.replace(&acc, "").into_owned()
            });
        let stripped = stripped.trim();
        if !stripped.is_empty() {
            return stripped.to_string();
        }
    }

    fallback_prompt(text).unwrap_or_else(|| text.to_string())
}

fn fallback_prompt(text: &str) -> Option<String> {
    let found = TRIGGER_WORD.find(text)?;
    let rest = text[found.end()..].trim();
    if rest.is_empty() {
        return None;
    }
    if LEADING_PREPOSITION.is_match(rest) {
        return rest
            .split_once(char::is_whitespace)
            .map(|(_, tail)| tail.trim().to_string())
            .filter(|tail| !tail.is_empty());
    }
    Some(rest.to_string())
}

static ASSISTANT_PROPOSAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"I('ll| will) (generate|create|make|produce) (an |a |)image",
        r"I can (generate|create|make|produce) (an |a |)image",
        r"using FLUX",
        r"choose (between|from) FLUX",
        r"FLUX( |\.)(Free|Pro|Dev)",
        r"image generation",
    ]
    .iter()
    .map(|p| ci(p))
    .collect()
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| ci(r#""([^"]+)""#));
static PROPOSAL_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    ci(r"^\s*(I'll|I will|Let me|I can)\s+((generate|create|make|produce|draw)\s+)?((an|a)\s+)?((image|picture)\s+)?((of|showing)\s+)?")
});
static PROPOSAL_TRAIL: LazyLock<Regex> = LazyLock::new(|| ci(r"\s*using FLUX.*$"));

pub const FALLBACK_PROPOSAL_PROMPT: &str = "visual representation of the user's request";

/// Whether an assistant reply offers to generate an image itself.
pub fn proposes_image(response: &str) -> bool {
    ASSISTANT_PROPOSAL.iter().any(|p| p.is_match(response))
}

/// Pull the image description out of an assistant reply that proposes one.
pub fn extract_proposed_prompt(response: &str) -> String {
    if let Some(quoted) = QUOTED
        .captures_iter(response)
        .map(|c| c[1].trim().to_string())
        .find(|q| q.chars().count() > 3)
    {
        return quoted;
    }

    for line in response.lines() {
        let lower = line.to_lowercase();
        if !(lower.contains("generate")
            || lower.contains("create")
            || lower.contains("image of")
            || lower.contains("picture of"))
        {
            continue;
        }
        let cleaned = PROPOSAL_LEAD.replace(line, "");
        let cleaned = PROPOSAL_TRAIL.replace(&cleaned, "");
        let cleaned = cleaned.trim().trim_end_matches(['.', ':', '!']).trim();
        if cleaned.chars().count() > 3 {
            return cleaned.to_string();
        }
    }

    FALLBACK_PROPOSAL_PROMPT.to_string()
}
