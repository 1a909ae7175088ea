use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;

use haven_core::counselor::{CounselorProfile, Personality};
use haven_core::severity::Severity;

/// Hard ceiling on how long a persona may "type" before replying.
const MAX_REPLY_DELAY: Duration = Duration::from_secs(10);

/// A composed counselor reply plus how long to simulate typing before
/// delivering it.
#[derive(Clone, Debug, PartialEq)]
pub struct CounselorReply {
    pub content: String,
    pub delay: Duration,
}

/// Reply generation seam. The engine only sees this trait, so tests swap
/// in [`MockResponder`] for deterministic transcripts.
pub trait CounselorResponder: Send + Sync {
    fn compose(
        &self,
        counselor: &CounselorProfile,
        level: Severity,
        user_text: &str,
    ) -> CounselorReply;
}

/// Template-based persona responder. No language understanding: the reply
/// is picked by assessed severity and colored by the persona's tone.
#[derive(Clone, Copy, Debug, Default)]
pub struct PersonaResponder;

impl PersonaResponder {
    fn opener(personality: Personality) -> &'static str {
        match personality {
            Personality::TraumaInformed => "Thank you for trusting me with this.",
            Personality::Empathetic => "I hear you, and I'm so glad you reached out.",
            Personality::Direct => "Okay. Let's work through this together.",
            Personality::Warm => "I'm really glad you're here with me.",
            Personality::Calm => "Take a breath with me. There's no rush.",
        }
    }

    fn body(level: Severity) -> &'static str {
        match level {
            Severity::Critical => {
                "Your safety matters more than anything right now. You don't have to \
                 face this alone — help is already on the way, and I'm staying right \
                 here with you. If anything changes, you can always call or text 988."
            }
            Severity::High => {
                "What you're carrying sounds incredibly heavy. Can you tell me more \
                 about what's been happening? If things ever feel like too much, 988 \
                 is there around the clock."
            }
            Severity::Moderate => {
                "That sounds really hard, and it makes sense that you're struggling. \
                 What's been weighing on you the most?"
            }
            Severity::Low => {
                "I'm listening. Sometimes just saying things out loud helps — what's \
                 been on your mind lately?"
            }
            Severity::Safe => "How are you feeling today? I'm here whenever you want to talk.",
        }
    }

    /// Persona base plus a length-proportional component and a little
    /// random jitter, never exceeding [`MAX_REPLY_DELAY`].
    fn delay(counselor: &CounselorProfile, user_text: &str) -> Duration {
        let base = Duration::from_secs(counselor.avg_response_secs);
        let proportional = Duration::from_millis((user_text.chars().count() as u64) * 25);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=1500));
        (base + proportional + jitter).min(MAX_REPLY_DELAY)
    }
}

impl CounselorResponder for PersonaResponder {
    fn compose(
        &self,
        counselor: &CounselorProfile,
        level: Severity,
        user_text: &str,
    ) -> CounselorReply {
        let content = format!(
            "{} {}",
            Self::opener(counselor.personality),
            Self::body(level)
        );
        CounselorReply {
            content,
            delay: Self::delay(counselor, user_text),
        }
    }
}

/// Pre-programmed replies for deterministic tests. Replies are consumed in
/// sequence; once exhausted the last one repeats, so a responder can never
/// leave a session without an answer.
pub struct MockResponder {
    replies: Vec<String>,
    delay: Duration,
    call_count: AtomicUsize,
}

impl MockResponder {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            delay: Duration::ZERO,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl CounselorResponder for MockResponder {
    fn compose(
        &self,
        _counselor: &CounselorProfile,
        _level: Severity,
        _user_text: &str,
    ) -> CounselorReply {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        let content = self
            .replies
            .get(idx.min(self.replies.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| "I'm here with you.".to_string());
        CounselorReply {
            content,
            delay: self.delay,
        }
    }
}
