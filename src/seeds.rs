//! Built-in fallback content.
//!
//! These artifacts guarantee the app is useful even without a generator key or
//! when the model misbehaves. Every function is deterministic for a given
//! request and yields the same shape invariants as a normalized model answer.

use crate::domain::{
  Challenge, ChallengeSet, CuratedResources, Difficulty, LearningArtifact, Level, Milestone, MilestoneStatus,
  Notes, Question, Quiz, Resource, ResourceType, Roadmap, SolutionEvaluation, Topic,
};
use crate::request::{
  ChallengeSetParams, DifficultyFilter, EvaluationParams, GenerationParams, NotesParams, QuizParams,
  ResourcesParams, RoadmapParams,
};
use crate::util::slugify;

pub fn fallback_artifact(params: &GenerationParams) -> LearningArtifact {
  match params {
    GenerationParams::Roadmap(p) => LearningArtifact::Roadmap(fallback_roadmap(p)),
    GenerationParams::Quiz(p) => LearningArtifact::Quiz(fallback_quiz(p)),
    GenerationParams::ChallengeSet(p) => LearningArtifact::ChallengeSet(fallback_challenges(p)),
    GenerationParams::Notes(p) => LearningArtifact::Notes(fallback_notes(p)),
    GenerationParams::SolutionEvaluation(p) => LearningArtifact::SolutionEvaluation(local_evaluation(p)),
    GenerationParams::CuratedResources(p) => LearningArtifact::CuratedResources(fallback_resources(p)),
  }
}

/// (title, description, [topics]) per level. Six milestones each.
fn roadmap_outline(level: Level) -> [(&'static str, &'static str, [&'static str; 3]); 6] {
  match level {
    Level::Beginner => [
      ("Foundations", "Programming basics and the tools of the trade.", ["Variables and control flow", "Functions", "Using the terminal"]),
      ("Core Concepts", "Data structures every developer relies on.", ["Arrays and lists", "Maps and sets", "Strings and text"]),
      ("Version Control", "Track and share your work.", ["Git basics", "Branching", "Pull requests"]),
      ("First Projects", "Apply the basics in small programs.", ["Reading requirements", "Breaking work into steps", "Debugging"]),
      ("Testing Basics", "Prove your code works.", ["Unit tests", "Assertions", "Test-driven habits"]),
      ("Portfolio", "Show what you built.", ["Writing a README", "Publishing a project", "Planning next steps"]),
    ],
    Level::Intermediate => [
      ("Design Principles", "Write code others can change.", ["Modularity", "Naming and readability", "Refactoring"]),
      ("Data and Storage", "Persist and query data.", ["Relational modeling", "SQL queries", "Indexes"]),
      ("Networking and APIs", "Talk to other systems.", ["HTTP fundamentals", "REST design", "Authentication"]),
      ("Algorithms", "Pick the right approach.", ["Complexity analysis", "Sorting and searching", "Recursion"]),
      ("Tooling and Automation", "Ship reliably.", ["Continuous integration", "Linters and formatters", "Dependency management"]),
      ("Team Project", "Build something larger with others.", ["Code review", "Issue tracking", "Iterative delivery"]),
    ],
    Level::Advanced => [
      ("System Design", "Architect for scale.", ["Scalability patterns", "Caching strategies", "Trade-off analysis"]),
      ("Concurrency", "Do many things at once safely.", ["Threads and async", "Synchronization", "Message passing"]),
      ("Performance", "Measure before optimizing.", ["Profiling", "Memory behavior", "Benchmarking"]),
      ("Reliability", "Keep systems running.", ["Observability", "Failure handling", "Incident response"]),
      ("Security", "Protect users and data.", ["Threat modeling", "Secure coding", "Secrets management"]),
      ("Leadership", "Grow beyond your own code.", ["Mentoring", "Technical writing", "Driving decisions"]),
    ],
  }
}

pub fn fallback_roadmap(p: &RoadmapParams) -> Roadmap {
  let weeks = if p.hours_per_week >= 15 { 1 } else if p.hours_per_week >= 8 { 2 } else { 3 };
  let milestones = roadmap_outline(p.experience_level)
    .iter()
    .enumerate()
    .map(|(i, (title, description, topics))| Milestone {
      id: format!("m{}", i + 1),
      title: (*title).to_string(),
      description: (*description).to_string(),
      skills: topics.iter().map(|t| (*t).to_string()).collect(),
      estimated_weeks: weeks,
      status: if i == 0 { MilestoneStatus::Current } else { MilestoneStatus::Locked },
      topics: topics
        .iter()
        .map(|t| Topic { name: (*t).to_string(), description: String::new(), is_completed: false })
        .collect(),
    })
    .collect();

  Roadmap {
    title: format!("{} Roadmap ({})", p.career_goal, p.experience_level.as_str()),
    level: p.experience_level,
    milestones,
  }
}

pub fn fallback_quiz(p: &QuizParams) -> Quiz {
  let topic = p.topic.as_str();
  let bank: [(String, [String; 4], usize, String); 5] = [
    (
      format!("What is the most effective first step when learning {topic}?"),
      [
        "Memorize every detail up front".into(),
        format!("Understand the core concepts of {topic} and practice them"),
        "Skip the fundamentals".into(),
        "Only read about it".into(),
      ],
      1,
      "Concepts plus deliberate practice build durable understanding.".into(),
    ),
    (
      format!("How should you verify your understanding of {topic}?"),
      [
        "Assume it works".into(),
        "Wait until a production incident".into(),
        "Ask someone else to remember it".into(),
        "Build a small example and test it".into(),
      ],
      3,
      "Small experiments give fast, concrete feedback.".into(),
    ),
    (
      format!("When you get stuck on a {topic} problem, what helps most?"),
      [
        "Break the problem into smaller steps".into(),
        "Give up on the topic".into(),
        "Rewrite everything from scratch immediately".into(),
        "Ignore the error messages".into(),
      ],
      0,
      "Decomposition makes hard problems tractable.".into(),
    ),
    (
      format!("Which resource is usually the most reliable reference for {topic}?"),
      [
        "A random forum comment".into(),
        "An outdated screenshot".into(),
        "The official documentation".into(),
        "Guessing".into(),
      ],
      2,
      "Official documentation is maintained alongside the technology.".into(),
    ),
    (
      format!("What is a good way to retain what you learned about {topic}?"),
      [
        "Never revisit it".into(),
        "Explain it to someone else or write notes".into(),
        "Study only the night before".into(),
        "Copy code without reading it".into(),
      ],
      1,
      "Teaching and note-taking reinforce memory.".into(),
    ),
  ];

  let questions = (0..p.question_count as usize)
    .map(|i| {
      let (text, options, correct, explanation) = &bank[i % bank.len()];
      Question {
        id: format!("q{}", i + 1),
        text: text.clone(),
        options: options.to_vec(),
        correct_option_index: *correct,
        explanation: explanation.clone(),
      }
    })
    .collect();

  Quiz { title: format!("{} Quiz", p.topic), questions }
}

/// Fixed generic challenge bank.
fn challenge_bank() -> Vec<(&'static str, &'static str, Difficulty, &'static str, u8, [&'static str; 2])> {
  vec![
    ("two-sum", "Two Sum", Difficulty::Easy, "Return indices of the two numbers that add up to a target.", 49, ["arrays", "hash maps"]),
    ("reverse-string", "Reverse a String", Difficulty::Easy, "Reverse the characters of a string in place.", 76, ["strings", "two pointers"]),
    ("valid-parentheses", "Valid Parentheses", Difficulty::Easy, "Check whether every bracket is closed in the right order.", 41, ["stacks", "strings"]),
    ("merge-intervals", "Merge Intervals", Difficulty::Medium, "Merge all overlapping intervals.", 46, ["sorting", "arrays"]),
    ("lru-cache", "LRU Cache", Difficulty::Medium, "Design a least-recently-used cache with O(1) operations.", 42, ["design", "linked lists"]),
    ("word-ladder", "Word Ladder", Difficulty::Hard, "Find the shortest transformation sequence between two words.", 37, ["graphs", "bfs"]),
  ]
}

pub fn fallback_challenges(p: &ChallengeSetParams) -> ChallengeSet {
  let bank = challenge_bank();
  let filtered: Vec<_> = match p.difficulty {
    DifficultyFilter::Mixed => bank.clone(),
    DifficultyFilter::Only(d) => bank.iter().filter(|c| c.2 == d).cloned().collect(),
  };
  let pool = if filtered.is_empty() { bank } else { filtered };

  let challenges = (0..p.count as usize)
    .map(|i| {
      let (slug, title, difficulty, description, rate, skills) = pool[i % pool.len()];
      // Cycling through the pool keeps ids unique with a round suffix.
      let round = i / pool.len();
      Challenge {
        id: if round == 0 { slug.to_string() } else { format!("{slug}-{}", round + 1) },
        title: title.to_string(),
        difficulty,
        category: p.category.clone(),
        description: description.to_string(),
        acceptance_rate: rate,
        skills: skills.iter().map(|s| (*s).to_string()).collect(),
        points: difficulty.default_points(),
      }
    })
    .collect();

  ChallengeSet { challenges }
}

pub fn fallback_notes(p: &NotesParams) -> Notes {
  let t = &p.topic;
  let markdown = format!(
    "# {t}\n\n\
     ## Overview\n\n{t} is an important subject at the {level} level. Start by learning what problem it solves and where it is used.\n\n\
     ## Key Concepts\n\n- Core terminology of {t}\n- The main building blocks and how they fit together\n- Typical use cases\n\n\
     ## Practice\n\n1. Read the official documentation for {t}.\n2. Build a small example from scratch.\n3. Change one thing at a time and observe the result.\n\n\
     ## Common Pitfalls\n\n- Skipping the fundamentals\n- Copying code without understanding it\n\n\
     ## Summary\n\nFocus on understanding the concepts of {t}, then reinforce them with hands-on practice.\n",
    level = p.level.as_str(),
  );
  Notes { topic: t.clone(), markdown }
}

/// Local heuristic review used when the model is unavailable. It never claims a pass,
/// because nothing was executed.
pub fn local_evaluation(p: &EvaluationParams) -> SolutionEvaluation {
  let code = p.code.as_str();
  let lines = code.lines().filter(|l| !l.trim().is_empty()).count();
  let lang = p.language.to_lowercase();
  let defines_fn = ["fn ", "def ", "function", "func ", "=>", "public ", "int ", "void "]
    .iter()
    .any(|k| code.contains(k));
  let has_return = code.contains("return") || lang == "rust";

  let mut strengths = Vec::new();
  let mut improvements = Vec::new();
  let mut score: u8 = 0;

  if defines_fn {
    strengths.push("Solution is organized into a function".to_string());
    score += 15;
  } else {
    improvements.push("Wrap the solution in a function with clear inputs and outputs".to_string());
  }
  if has_return {
    score += 10;
  } else {
    improvements.push("Make sure the function returns its result".to_string());
  }
  if (3..=200).contains(&lines) {
    strengths.push("Solution length is reasonable".to_string());
    score += 10;
  } else {
    improvements.push("Keep the solution focused; very short or very long answers are hard to review".to_string());
  }
  if code.contains("TODO") || code.contains("todo!") || code.contains("unimplemented!") {
    improvements.push("Remove placeholders before submitting".to_string());
  } else {
    score += 5;
  }

  SolutionEvaluation {
    passed: false,
    score,
    feedback: format!(
      "(local) Automated review for '{}' is unavailable right now; this is a structural check only. Resubmit later for a full evaluation.",
      p.challenge_id
    ),
    strengths,
    improvements,
    complexity_note: "Not analyzed".into(),
    tests_passed: 0,
    tests_total: 0,
  }
}

pub fn fallback_resources(p: &ResourcesParams) -> CuratedResources {
  let topic = p.topic.as_str();
  let search = |base: &str, key: &str, q: String| -> String {
    reqwest::Url::parse_with_params(base, &[(key, q)])
      .map(|u| u.to_string())
      .unwrap_or_else(|_| base.to_string())
  };
  let candidates = vec![
    Resource {
      title: format!("{topic} tutorials on YouTube"),
      url: search("https://www.youtube.com/results", "search_query", format!("{topic} tutorial {}", p.level.as_str())),
      resource_type: ResourceType::Video,
      description: "Video walkthroughs, sorted by relevance.".into(),
    },
    Resource {
      title: format!("{topic} on MDN Web Docs"),
      url: search("https://developer.mozilla.org/en-US/search", "q", topic.to_string()),
      resource_type: ResourceType::Documentation,
      description: "Reference documentation and guides.".into(),
    },
    Resource {
      title: format!("{topic} on freeCodeCamp"),
      url: search("https://www.freecodecamp.org/news/search/", "query", topic.to_string()),
      resource_type: ResourceType::Article,
      description: "Free long-form articles and tutorials.".into(),
    },
    Resource {
      title: format!("{topic} courses on Coursera"),
      url: search("https://www.coursera.org/search", "query", topic.to_string()),
      resource_type: ResourceType::Course,
      description: "Structured courses, many free to audit.".into(),
    },
    Resource {
      title: format!("{topic} questions on Stack Overflow"),
      url: format!("https://stackoverflow.com/questions/tagged/{}", slugify(topic)),
      resource_type: ResourceType::Article,
      description: "Common problems and answers from practitioners.".into(),
    },
    Resource {
      title: format!("{topic} projects on GitHub"),
      url: search("https://github.com/search", "q", topic.to_string()),
      resource_type: ResourceType::Documentation,
      description: "Open-source code to read and learn from.".into(),
    },
  ];

  CuratedResources {
    topic: topic.to_string(),
    resources: candidates.into_iter().take(p.count as usize).collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::{GenerationRequest, QuizInput, RoadmapInput};

  #[test]
  fn fallback_roadmap_has_six_milestones_and_one_current() {
    let req = GenerationRequest::roadmap(RoadmapInput { experience_level: Some("advanced".into()), ..Default::default() });
    let GenerationParams::Roadmap(p) = req.params() else { panic!("roadmap params") };
    let r = fallback_roadmap(p);
    assert_eq!(r.milestones.len(), 6);
    assert_eq!(r.level, Level::Advanced);
    assert_eq!(r.milestones.iter().filter(|m| m.status == MilestoneStatus::Current).count(), 1);
    assert!(r.milestones.iter().all(|m| m.estimated_weeks >= 1 && !m.topics.is_empty()));
  }

  #[test]
  fn fallback_quiz_matches_requested_count() {
    let req = GenerationRequest::quiz(QuizInput { topic: Some("Graphs".into()), difficulty: Some("hard".into()), question_count: Some(7) }).unwrap();
    let GenerationParams::Quiz(p) = req.params() else { panic!("quiz params") };
    let q = fallback_quiz(p);
    assert_eq!(q.questions.len(), 7);
    assert!(q.questions.iter().all(|q| q.options.len() == 4 && q.correct_option_index < 4));
    assert!(q.questions[0].text.contains("Graphs"));
  }

  #[test]
  fn fallback_challenges_respect_difficulty_and_unique_ids() {
    let p = ChallengeSetParams { category: "algorithms".into(), difficulty: DifficultyFilter::Only(Difficulty::Easy), count: 5 };
    let set = fallback_challenges(&p);
    assert_eq!(set.challenges.len(), 5);
    assert!(set.challenges.iter().all(|c| c.difficulty == Difficulty::Easy));
    let mut ids: Vec<_> = set.challenges.iter().map(|c| c.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
  }

  #[test]
  fn local_evaluation_never_passes() {
    let p = EvaluationParams {
      challenge_id: "two-sum".into(),
      code: "def two_sum(nums, target):\n    seen = {}\n    return []\n".into(),
      language: "python".into(),
      problem: String::new(),
    };
    let e = local_evaluation(&p);
    assert!(!e.passed);
    assert!(e.score <= 100);
    assert_eq!((e.tests_passed, e.tests_total), (0, 0));
    assert!(!e.strengths.is_empty());
  }

  #[test]
  fn fallback_resources_are_valid_links() {
    let p = ResourcesParams { topic: "Rust async".into(), level: Level::Intermediate, count: 4 };
    let r = fallback_resources(&p);
    assert_eq!(r.resources.len(), 4);
    assert!(r.resources.iter().all(|res| res.url.starts_with("https://")));
    assert!(r.resources[0].url.contains("search_query=Rust+async"));
  }
}
