//! Structured-output parsing and normalization.
//!
//! Model output goes through two stages:
//! 1) `parse_structured`: strict JSON parse, then a best-effort repair that scans
//!    for the first balanced `{...}` span that parses as an object. The scanner
//!    understands string literals and escapes, so braces inside strings do not
//!    confuse it. JSON mode on the generator is the primary defense; this is
//!    only the last resort.
//! 2) `normalize`: per-kind schema check that yields a fully-populated artifact
//!    or a `ParseError`. Required fields are checked, optional ones backfilled,
//!    enumerations coerced, ranges clamped, and unusable entries dropped.

use std::collections::HashSet;

use serde_json::Value;

use crate::domain::{
  Challenge, ChallengeSet, CuratedResources, Difficulty, LearningArtifact, Milestone, MilestoneStatus,
  Notes, Question, Quiz, Resource, ResourceType, Roadmap, SolutionEvaluation, Topic,
};
use crate::error::ParseError;
use crate::request::{
  ChallengeSetParams, DifficultyFilter, GenerationParams, QuizParams, ResourcesParams, RoadmapParams,
};
use crate::util::slugify;

/// Parsed JSON plus whether the repair path was needed to get it.
#[derive(Debug)]
pub struct Parsed {
  pub value: Value,
  pub repaired: bool,
}

pub fn parse_structured(raw: &str) -> Result<Parsed, ParseError> {
  let trimmed = raw.trim();
  if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
    if value.is_object() || value.is_array() {
      return Ok(Parsed { value, repaired: false });
    }
  }
  extract_json_object(trimmed)
    .map(|value| Parsed { value, repaired: true })
    .ok_or(ParseError::NoJson)
}

/// First balanced `{...}` span in `raw` that parses as a JSON object.
pub fn extract_json_object(raw: &str) -> Option<Value> {
  // Braces and quotes are ASCII, so byte offsets always land on char boundaries.
  let bytes = raw.as_bytes();
  let mut from = 0;
  while let Some(rel) = raw[from..].find('{') {
    let start = from + rel;
    if let Some(len) = balanced_len(&bytes[start..]) {
      if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&raw[start..start + len]) {
        return Some(v);
      }
    }
    from = start + 1;
  }
  None
}

fn balanced_len(bytes: &[u8]) -> Option<usize> {
  let mut depth = 0usize;
  let mut in_str = false;
  let mut escaped = false;
  for (i, &b) in bytes.iter().enumerate() {
    if in_str {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == b'"' {
        in_str = false;
      }
      continue;
    }
    match b {
      b'"' => in_str = true,
      b'{' => depth += 1,
      b'}' => {
        depth = depth.checked_sub(1)?;
        if depth == 0 {
          return Some(i + 1);
        }
      }
      _ => {}
    }
  }
  None
}

/// Turn raw model text into the artifact for `params`.
pub fn normalize(params: &GenerationParams, raw: &str) -> Result<(LearningArtifact, bool), ParseError> {
  if let GenerationParams::Notes(p) = params {
    return Ok((LearningArtifact::Notes(normalize_notes(&p.topic, raw)?), false));
  }
  let Parsed { value, repaired } = parse_structured(raw)?;
  let artifact = match params {
    GenerationParams::Roadmap(p) => LearningArtifact::Roadmap(normalize_roadmap(&value, p)?),
    GenerationParams::Quiz(p) => LearningArtifact::Quiz(normalize_quiz(&value, p)?),
    GenerationParams::ChallengeSet(p) => LearningArtifact::ChallengeSet(normalize_challenges(&value, p)?),
    GenerationParams::SolutionEvaluation(_) => LearningArtifact::SolutionEvaluation(normalize_evaluation(&value)?),
    GenerationParams::CuratedResources(p) => LearningArtifact::CuratedResources(normalize_resources(&value, p)?),
    GenerationParams::Notes(p) => LearningArtifact::Notes(normalize_notes(&p.topic, raw)?),
  };
  Ok((artifact, repaired))
}

pub fn normalize_roadmap(value: &Value, params: &RoadmapParams) -> Result<Roadmap, ParseError> {
  let items = array_at(value, &["milestones", "phases", "roadmap"])
    .ok_or_else(|| ParseError::Malformed("milestones".into()))?;

  let mut seen_ids = HashSet::new();
  let mut milestones = Vec::new();
  for (i, m) in items.iter().enumerate() {
    let Some(title) = str_field(m, &["title", "name"]) else { continue };
    let topics: Vec<Topic> = array_at(m, &["topics", "lessons"])
      .map(|ts| ts.iter().filter_map(topic_from).collect())
      .unwrap_or_default();
    if topics.is_empty() {
      continue;
    }

    let mut id = str_field(m, &["id"]).map(|s| slugify(&s)).unwrap_or_default();
    if id.is_empty() || seen_ids.contains(&id) {
      id = format!("m{}", i + 1);
    }
    seen_ids.insert(id.clone());

    milestones.push(Milestone {
      id,
      title,
      description: str_field(m, &["description", "summary"]).unwrap_or_default(),
      skills: dedupe_ci(str_list(m, &["skills"])),
      estimated_weeks: num_field(m, &["estimatedWeeks", "estimated_weeks", "weeks"])
        .map(|w| w.round().clamp(1.0, 52.0) as u32)
        .unwrap_or(2),
      status: MilestoneStatus::Locked,
      topics,
    });
  }
  if milestones.is_empty() {
    return Err(ParseError::Malformed("milestones".into()));
  }

  let mut roadmap = Roadmap {
    title: str_field(value, &["title"]).unwrap_or_else(|| format!("{} Roadmap", params.career_goal)),
    level: params.experience_level,
    milestones,
  };
  roadmap.reset_statuses();
  Ok(roadmap)
}

fn topic_from(v: &Value) -> Option<Topic> {
  let (name, description) = match v {
    Value::String(s) => (s.trim().to_string(), String::new()),
    Value::Object(_) => (
      str_field(v, &["name", "title"])?,
      str_field(v, &["description", "summary"]).unwrap_or_default(),
    ),
    _ => return None,
  };
  (!name.is_empty()).then_some(Topic { name, description, is_completed: false })
}

pub fn normalize_quiz(value: &Value, params: &QuizParams) -> Result<Quiz, ParseError> {
  let items = array_at(value, &["questions", "quiz"])
    .ok_or_else(|| ParseError::Malformed("questions".into()))?;

  let mut questions = Vec::new();
  for q in items {
    let Some(text) = str_field(q, &["text", "question"]) else { continue };
    let options = str_list(q, &["options", "choices"]);
    if options.len() < 4 {
      continue;
    }
    let options: Vec<String> = options.into_iter().take(4).collect();
    let Some(correct) = correct_index(q, &options) else { continue };
    questions.push(Question {
      id: format!("q{}", questions.len() + 1),
      text,
      options,
      correct_option_index: correct,
      explanation: str_field(q, &["explanation", "rationale"]).unwrap_or_default(),
    });
    if questions.len() as u32 == params.question_count {
      break;
    }
  }
  if questions.is_empty() {
    return Err(ParseError::Malformed("questions".into()));
  }
  Ok(Quiz {
    title: str_field(value, &["title"]).unwrap_or_else(|| format!("{} Quiz", params.topic)),
    questions,
  })
}

/// Accepts a numeric index, a letter ("B"), or the text of the correct option.
fn correct_index(q: &Value, options: &[String]) -> Option<usize> {
  let keys = ["correctOptionIndex", "correct_option_index", "correctAnswer", "correct_answer", "answer"];
  for key in keys {
    match q.get(key) {
      Some(Value::Number(n)) => {
        let idx = n.as_u64()? as usize;
        return (idx < options.len()).then_some(idx);
      }
      Some(Value::String(s)) => {
        let s = s.trim();
        if let Ok(idx) = s.parse::<usize>() {
          return (idx < options.len()).then_some(idx);
        }
        if s.len() == 1 {
          let c = s.chars().next()?.to_ascii_uppercase();
          if ('A'..='D').contains(&c) {
            return Some(c as usize - 'A' as usize);
          }
        }
        return options.iter().position(|o| o.eq_ignore_ascii_case(s));
      }
      _ => {}
    }
  }
  None
}

pub fn normalize_challenges(value: &Value, params: &ChallengeSetParams) -> Result<ChallengeSet, ParseError> {
  let items = array_at(value, &["challenges", "problems"])
    .ok_or_else(|| ParseError::Malformed("challenges".into()))?;

  let category_slug = slugify(&params.category);
  let mut seen_ids = HashSet::new();
  let mut challenges = Vec::new();
  for c in items {
    let Some(title) = str_field(c, &["title", "name"]) else { continue };
    let difficulty = match params.difficulty {
      DifficultyFilter::Only(d) => d,
      DifficultyFilter::Mixed => str_field(c, &["difficulty"])
        .and_then(|d| Difficulty::parse(&d))
        .unwrap_or(Difficulty::Medium),
    };
    let mut id = str_field(c, &["id"]).map(|s| slugify(&s)).unwrap_or_default();
    if id.is_empty() || seen_ids.contains(&id) {
      id = format!("{}-{}", category_slug, challenges.len() + 1);
    }
    seen_ids.insert(id.clone());

    challenges.push(Challenge {
      id,
      title,
      difficulty,
      category: str_field(c, &["category"]).unwrap_or_else(|| params.category.clone()),
      description: str_field(c, &["description", "prompt"]).unwrap_or_default(),
      acceptance_rate: num_field(c, &["acceptanceRate", "acceptance_rate"])
        .map(|r| r.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(50),
      skills: dedupe_ci(str_list(c, &["skills", "tags"])),
      points: num_field(c, &["points"])
        .filter(|p| *p >= 1.0)
        .map(|p| p.round() as u32)
        .unwrap_or_else(|| difficulty.default_points()),
    });
    if challenges.len() as u32 == params.count {
      break;
    }
  }
  if challenges.is_empty() {
    return Err(ParseError::Malformed("challenges".into()));
  }
  Ok(ChallengeSet { challenges })
}

pub fn normalize_evaluation(value: &Value) -> Result<SolutionEvaluation, ParseError> {
  let score = num_field(value, &["score"])
    .ok_or_else(|| ParseError::Malformed("score".into()))?
    .round()
    .clamp(0.0, 100.0) as u8;
  let passed = value
    .get("passed")
    .or_else(|| value.get("correct"))
    .and_then(Value::as_bool)
    .unwrap_or(score >= 60);

  let tests_total = num_field(value, &["testsTotal", "tests_total"]).map(|n| n.max(0.0) as u32);
  let tests_passed = num_field(value, &["testsPassed", "tests_passed"]).map(|n| n.max(0.0) as u32);
  let tests_total = tests_total.or(tests_passed).unwrap_or(0);
  let tests_passed = tests_passed
    .unwrap_or(if passed { tests_total } else { 0 })
    .min(tests_total);

  Ok(SolutionEvaluation {
    passed,
    score,
    feedback: str_field(value, &["feedback", "explanation"]).unwrap_or_default(),
    strengths: str_list(value, &["strengths"]),
    improvements: str_list(value, &["improvements", "suggestions"]),
    complexity_note: str_field(value, &["complexityNote", "complexity_note", "complexity"]).unwrap_or_default(),
    tests_passed,
    tests_total,
  })
}

pub fn normalize_resources(value: &Value, params: &ResourcesParams) -> Result<CuratedResources, ParseError> {
  let items = array_at(value, &["resources", "items"])
    .ok_or_else(|| ParseError::Malformed("resources".into()))?;

  let mut resources = Vec::new();
  for r in items {
    let (Some(title), Some(url)) = (str_field(r, &["title", "name"]), str_field(r, &["url", "link"])) else {
      continue;
    };
    let url_ok = reqwest::Url::parse(&url)
      .map(|u| u.scheme() == "http" || u.scheme() == "https")
      .unwrap_or(false);
    if !url_ok {
      continue;
    }
    resources.push(Resource {
      title,
      url,
      resource_type: str_field(r, &["type", "kind"])
        .and_then(|t| ResourceType::parse(&t))
        .unwrap_or(ResourceType::Article),
      description: str_field(r, &["description"]).unwrap_or_default(),
    });
    if resources.len() as u32 == params.count {
      break;
    }
  }
  if resources.is_empty() {
    return Err(ParseError::Malformed("resources".into()));
  }
  Ok(CuratedResources { topic: params.topic.clone(), resources })
}

/// Notes are free-form markdown. A whole-document code fence is unwrapped, and a JSON
/// wrapper with a `markdown`/`content` field is accepted too.
pub fn normalize_notes(topic: &str, raw: &str) -> Result<Notes, ParseError> {
  let mut text = raw.trim().to_string();
  if text.starts_with('{') {
    if let Ok(v) = serde_json::from_str::<Value>(&text) {
      if let Some(md) = str_field(&v, &["markdown", "content", "notes"]) {
        text = md;
      }
    }
  }
  if let Some(rest) = text.strip_prefix("```") {
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    text = body.trim_end().trim_end_matches("```").trim().to_string();
  }
  if text.is_empty() {
    return Err(ParseError::Malformed("markdown".into()));
  }
  Ok(Notes { topic: topic.to_string(), markdown: text })
}

// -------- Lenient field access --------

fn array_at<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
  if let Some(arr) = v.as_array() {
    return Some(arr);
  }
  keys.iter().find_map(|k| v.get(*k).and_then(Value::as_array))
}

fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|k| {
    v.get(*k)
      .and_then(Value::as_str)
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
  })
}

/// Numbers may arrive as JSON numbers or as strings like "85" / "85%".
fn num_field(v: &Value, keys: &[&str]) -> Option<f64> {
  keys.iter().find_map(|k| match v.get(*k)? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
    _ => None,
  })
  .filter(|n| n.is_finite())
}

/// String arrays, tolerating a single comma-separated string.
fn str_list(v: &Value, keys: &[&str]) -> Vec<String> {
  for k in keys {
    match v.get(*k) {
      Some(Value::Array(items)) => {
        return items
          .iter()
          .filter_map(Value::as_str)
          .map(|s| s.trim().to_string())
          .filter(|s| !s.is_empty())
          .collect();
      }
      Some(Value::String(s)) => {
        return s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect();
      }
      _ => {}
    }
  }
  Vec::new()
}

fn dedupe_ci(items: Vec<String>) -> Vec<String> {
  let mut seen = HashSet::new();
  items.into_iter().filter(|s| seen.insert(s.to_lowercase())).collect()
}
