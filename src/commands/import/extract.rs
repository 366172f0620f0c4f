use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::model::{PosterFieldsDraft, RawCandidate, SourceTag};

/// Instruction sent with every vision request. The reply must be a JSON
/// object with title/authors/tags/abstract; anything else counts as an
/// extraction failure.
const VISION_PROMPT: &str = r#"You are analyzing a research poster image. Extract the following information in JSON format:

{
  "title": "The main title of the poster",
  "authors": ["Author 1", "Author 2"],
  "tags": ["topic1", "topic2", "topic3"],
  "abstract": "A brief summary (2-3 sentences)"
}

Rules:
- For title: Extract ONLY the main title, not institution names
- For authors: List all author names you can clearly read
- For tags: Identify 3-5 key research topics/technologies
- For abstract: Summarize the main contribution in 2-3 sentences
- Return ONLY valid JSON

Analyze this poster:"#;

/// Capability seam for image-based extraction, so the inference backend is
/// swappable and mockable in tests.
pub trait VisionBackend {
    fn extract(&self, image_path: &Path) -> Result<PosterFieldsDraft>;
}

pub struct OllamaVision {
    agent: ureq::Agent,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct VisionReply {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
}

impl OllamaVision {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        // Vision models can be slow; the read timeout bounds the whole call.
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(timeout_secs))
            .timeout_write(Duration::from_secs(timeout_secs))
            .build();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

impl VisionBackend for OllamaVision {
    fn extract(&self, image_path: &Path) -> Result<PosterFieldsDraft> {
        let image_bytes = fs::read(image_path)
            .with_context(|| format!("failed to read image: {}", image_path.display()))?;
        let image_base64 = STANDARD.encode(&image_bytes);

        let response = self
            .agent
            .post(&format!("{}/api/generate", self.base_url))
            .send_json(serde_json::json!({
                "model": self.model,
                "prompt": VISION_PROMPT,
                "images": [image_base64],
                "stream": false,
                "format": "json",
            }))
            .with_context(|| format!("vision request failed for {}", image_path.display()))?;

        let body: serde_json::Value = response
            .into_json()
            .context("vision reply was not valid JSON")?;
        let reply_text = body
            .get("response")
            .and_then(|value| value.as_str())
            .context("vision reply missing response field")?;

        let reply: VisionReply = serde_json::from_str(reply_text)
            .context("vision reply did not parse into the expected shape")?;

        if reply.title.trim().is_empty() {
            bail!("vision reply has an empty title");
        }

        Ok(PosterFieldsDraft {
            title: reply.title,
            authors: reply.authors,
            tags: reply.tags,
            abstract_text: reply.abstract_text,
            source: SourceTag::VisionExtract,
        })
    }
}

/// Probes the inference endpoint. Cheap call with a short timeout; used to
/// fail fast before a batch rather than once per candidate.
pub fn vision_endpoint_available(base_url: &str) -> bool {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(2))
        .timeout_read(Duration::from_secs(2))
        .build();

    agent
        .get(&format!("{}/api/tags", base_url.trim_end_matches('/')))
        .call()
        .map(|response| response.status() == 200)
        .unwrap_or(false)
}

/// Produces a draft for one candidate. Vision is preferred when a backend is
/// supplied; any vision failure falls back to text parsing for this one
/// candidate and never aborts the batch. Returns the draft plus whether the
/// fallback was taken.
pub fn extract_fields(
    candidate: &RawCandidate,
    vision: Option<&dyn VisionBackend>,
    parser: &TextParser,
) -> (PosterFieldsDraft, bool) {
    let mut fell_back = false;

    if let (Some(backend), Some(image_path)) = (vision, candidate.image_path.as_deref()) {
        match backend.extract(image_path) {
            Ok(draft) => return (draft, false),
            Err(err) => {
                warn!(
                    source_key = %candidate.source_key,
                    error = %err,
                    "vision extraction failed, falling back to text parsing"
                );
                fell_back = true;
            }
        }
    }

    let text = candidate.extracted_text.as_deref().unwrap_or("");
    (parser.parse(text, &candidate.suggested_id), fell_back)
}

/// Keyword-to-tag vocabulary for the text strategy. Matched by substring
/// against the lowercased document text, capped at five tags.
const TAG_VOCABULARY: &[(&str, &str)] = &[
    ("ai", "artificial-intelligence"),
    ("machine learning", "machine-learning"),
    ("deep learning", "deep-learning"),
    ("neural network", "neural-networks"),
    ("robot", "robotics"),
    ("iot", "iot"),
    ("edge", "edge-computing"),
    ("security", "security"),
    ("privacy", "privacy"),
    ("healthcare", "healthcare"),
    ("sustainable", "sustainability"),
    ("quantum", "quantum-computing"),
    ("federated", "federated-learning"),
    ("computer vision", "computer-vision"),
    ("nlp", "nlp"),
];

const MAX_TAGS: usize = 5;
const MAX_AUTHORS: usize = 3;

/// Heuristic text strategy: lower precision than vision, but deterministic
/// and always available. Never fails, even on empty or binary-garbage text.
pub struct TextParser {
    skip_patterns: Vec<Regex>,
    author_line: Regex,
    author_split: Regex,
}

impl TextParser {
    pub fn new() -> Result<Self> {
        let skip_sources = [
            r"(?i)research.*institute",
            r"(?i)university",
            r"(?i)department",
            r"(?i)page \d+",
            r"^\d+$",
        ];

        let mut skip_patterns = Vec::with_capacity(skip_sources.len());
        for source in skip_sources {
            skip_patterns
                .push(Regex::new(source).context("failed to compile title skip pattern")?);
        }

        Ok(Self {
            skip_patterns,
            author_line: Regex::new(r"[A-Z][a-z]+.*[A-Z][a-z]+")
                .context("failed to compile author line pattern")?,
            author_split: Regex::new(r",|\band\b|\s{2,}")
                .context("failed to compile author split pattern")?,
        })
    }

    pub fn parse(&self, text: &str, fallback_id: &str) -> PosterFieldsDraft {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        PosterFieldsDraft {
            title: self.extract_title(&lines, fallback_id),
            authors: self.extract_authors(&lines),
            tags: extract_tags(text),
            abstract_text: extract_abstract(&lines),
            source: SourceTag::PdfExtract,
        }
    }

    fn extract_title(&self, lines: &[&str], fallback_id: &str) -> String {
        for line in lines.iter().take(10) {
            if self.skip_patterns.iter().any(|pattern| pattern.is_match(line)) {
                continue;
            }
            if line.len() < 10 || line.contains('@') || line.to_lowercase().contains("http") {
                continue;
            }
            if line.len() <= 150 && line.chars().any(|c| c.is_uppercase()) {
                return (*line).to_string();
            }
        }

        for line in lines.iter().take(5) {
            if line.len() > 10 {
                return truncate_with_ellipsis(line, 150);
            }
        }

        format!("Research Poster {fallback_id}")
    }

    fn extract_authors(&self, lines: &[&str]) -> Vec<String> {
        let mut authors = Vec::new();

        for line in lines.iter().skip(1).take(4) {
            if !self.author_line.is_match(line) || line.len() >= 100 {
                continue;
            }
            for candidate in self.author_split.split(line) {
                let candidate = candidate.trim();
                if !candidate.is_empty() {
                    authors.push(candidate.to_string());
                }
            }
        }

        if authors.is_empty() {
            authors.push("Unknown Author".to_string());
        }

        authors.truncate(MAX_AUTHORS);
        authors
    }
}

fn extract_abstract(lines: &[&str]) -> String {
    let markers = ["abstract", "summary", "introduction"];

    for (index, line) in lines.iter().enumerate() {
        let lowered = line.to_lowercase();
        if !markers.iter().any(|marker| lowered.contains(marker)) {
            continue;
        }

        let mut collected: Vec<&str> = Vec::new();
        for following in lines.iter().skip(index + 1).take(9) {
            if following.len() > 20 {
                collected.push(following);
            }
            if collected.iter().map(|part| part.len() + 1).sum::<usize>() > 300 {
                break;
            }
        }

        if !collected.is_empty() {
            return collected.join(" ");
        }
        break;
    }

    for line in lines.iter().skip(2) {
        if line.len() > 100 {
            return truncate_with_ellipsis(line, 400);
        }
    }

    "Research poster content extracted from PDF.".to_string()
}

fn extract_tags(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tags = Vec::new();

    for (keyword, tag) in TAG_VOCABULARY {
        if lowered.contains(keyword) && !tags.iter().any(|existing| existing == tag) {
            tags.push((*tag).to_string());
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }

    if tags.is_empty() {
        tags.push("research".to_string());
        tags.push("computer-science".to_string());
    }

    tags
}

fn truncate_with_ellipsis(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let truncated: String = line.chars().take(max_chars).collect();
    format!("{truncated}...")
}
