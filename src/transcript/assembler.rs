use crate::transcript::marker::{MarkerPolicy, SignMarker};
use crate::transcript::types::{Speaker, TranscriptChannel, Utterance};
use chrono::{DateTime, Utc};

/// Per-channel accumulation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Pending {
    #[default]
    Idle,
    Accumulating(String),
}

impl Pending {
    fn push(&mut self, fragment: &str) {
        match self {
            Pending::Idle => *self = Pending::Accumulating(fragment.to_string()),
            Pending::Accumulating(text) => text.push_str(fragment),
        }
    }

    fn take(&mut self) -> Option<String> {
        match std::mem::take(self) {
            Pending::Idle => None,
            Pending::Accumulating(text) => Some(text),
        }
    }
}

/// Turns transcript fragments into one utterance per channel per turn.
#[derive(Debug, Clone)]
pub struct TranscriptAssembler {
    input: Pending,
    output: Pending,
    marker: SignMarker,
    policy: MarkerPolicy,
    video_mode: bool,
}

impl TranscriptAssembler {
    pub fn new(marker: SignMarker, policy: MarkerPolicy) -> Self {
        Self {
            input: Pending::Idle,
            output: Pending::Idle,
            marker,
            policy,
            video_mode: false,
        }
    }

    /// Append a fragment. Empty or whitespace-only fragments are ignored.
    pub fn push_fragment(&mut self, channel: TranscriptChannel, fragment: &str) {
        if fragment.trim().is_empty() {
            return;
        }
        match channel {
            TranscriptChannel::Input => self.input.push(fragment),
            TranscriptChannel::Output => self.output.push(fragment),
        }
    }

    /// Close the turn, stamping utterances with the current time.
    pub fn turn_complete(&mut self) -> Vec<Utterance> {
        self.turn_complete_at(Utc::now())
    }

    /// Close the turn: input first, then output. Both channels return to idle.
    pub fn turn_complete_at(&mut self, timestamp: DateTime<Utc>) -> Vec<Utterance> {
        let mut utterances = Vec::with_capacity(2);

        if let Some(raw) = self.input.take() {
            let (speaker, text) = self.attribute_input(&raw);
            if !text.is_empty() {
                utterances.push(Utterance::new(speaker, text, timestamp));
            }
        }

        if let Some(raw) = self.output.take() {
            let text = raw.trim();
            if !text.is_empty() {
                utterances.push(Utterance::new(Speaker::Agent, text, timestamp));
            }
        }

        utterances
    }

    /// The marker only counts at the very start of the turn's input.
    fn attribute_input<'a>(&self, raw: &'a str) -> (Speaker, &'a str) {
        if self.policy.applies(self.video_mode)
            && let Some(signed) = self.marker.strip(raw)
        {
            return (Speaker::Signed, signed.trim());
        }
        (Speaker::User, raw.trim())
    }

    /// Video mode state, consulted by [`MarkerPolicy::VideoModeOnly`].
    pub fn set_video_mode(&mut self, enabled: bool) {
        self.video_mode = enabled;
    }

    /// Drop whatever is pending without emitting it.
    pub fn discard(&mut self) {
        self.input = Pending::Idle;
        self.output = Pending::Idle;
    }

    pub fn is_idle(&self) -> bool {
        self.input == Pending::Idle && self.output == Pending::Idle
    }
}

impl Default for TranscriptAssembler {
    fn default() -> Self {
        Self::new(SignMarker::default(), MarkerPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(utterances: &[Utterance]) -> Vec<(Speaker, &str)> {
        utterances
            .iter()
            .map(|u| (u.speaker, u.text.as_str()))
            .collect()
    }

    #[test]
    fn test_output_fragments_join_into_one_agent_utterance() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Output, "He");
        assembler.push_fragment(TranscriptChannel::Output, "llo");

        let utterances = assembler.turn_complete();
        assert_eq!(texts(&utterances), vec![(Speaker::Agent, "Hello")]);
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_marked_input_is_signed() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Input, "[ASL]: ");
        assembler.push_fragment(TranscriptChannel::Input, "Thanks");

        let utterances = assembler.turn_complete();
        assert_eq!(texts(&utterances), vec![(Speaker::Signed, "Thanks")]);
    }

    #[test]
    fn test_marker_after_leading_space_is_spoken_input() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Input, " [ASL]: Hi");

        let utterances = assembler.turn_complete();
        assert_eq!(texts(&utterances), vec![(Speaker::User, "[ASL]: Hi")]);
    }

    #[test]
    fn test_whitespace_only_emits_nothing() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Input, "   ");
        assembler.push_fragment(TranscriptChannel::Output, "\n\t");
        assembler.push_fragment(TranscriptChannel::Output, "");

        assert!(assembler.is_idle());
        assert!(assembler.turn_complete().is_empty());
    }

    #[test]
    fn test_input_is_emitted_before_output() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Output, "Sure.");
        assembler.push_fragment(TranscriptChannel::Input, "Can you help?");

        let utterances = assembler.turn_complete();
        assert_eq!(
            texts(&utterances),
            vec![(Speaker::User, "Can you help?"), (Speaker::Agent, "Sure.")]
        );
    }

    #[test]
    fn test_utterances_share_turn_timestamp() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Input, "a");
        assembler.push_fragment(TranscriptChannel::Output, "b");
        let now = Utc::now();

        let utterances = assembler.turn_complete_at(now);
        assert!(utterances.iter().all(|u| u.timestamp == now));
        assert_ne!(utterances[0].id, utterances[1].id);
    }

    #[test]
    fn test_text_is_trimmed_but_inner_spacing_kept() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Output, " Hello");
        assembler.push_fragment(TranscriptChannel::Output, " there ");

        let utterances = assembler.turn_complete();
        assert_eq!(utterances[0].text, "Hello there");
    }

    #[test]
    fn test_marker_only_input_emits_nothing() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Input, "[ASL]: ");
        assert!(assembler.turn_complete().is_empty());
    }

    #[test]
    fn test_video_mode_only_policy() {
        let mut assembler =
            TranscriptAssembler::new(SignMarker::default(), MarkerPolicy::VideoModeOnly);
        assembler.push_fragment(TranscriptChannel::Input, "[ASL]: Hi");
        assert_eq!(
            texts(&assembler.turn_complete()),
            vec![(Speaker::User, "[ASL]: Hi")]
        );

        assembler.set_video_mode(true);
        assembler.push_fragment(TranscriptChannel::Input, "[ASL]: Hi");
        assert_eq!(texts(&assembler.turn_complete()), vec![(Speaker::Signed, "Hi")]);
    }

    #[test]
    fn test_never_policy_keeps_marker() {
        let mut assembler = TranscriptAssembler::new(SignMarker::default(), MarkerPolicy::Never);
        assembler.push_fragment(TranscriptChannel::Input, "[ASL]: Hi");
        assert_eq!(
            texts(&assembler.turn_complete()),
            vec![(Speaker::User, "[ASL]: Hi")]
        );
    }

    #[test]
    fn test_turn_complete_resets_for_next_turn() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Output, "first");
        assembler.turn_complete();
        assembler.push_fragment(TranscriptChannel::Output, "second");

        assert_eq!(
            texts(&assembler.turn_complete()),
            vec![(Speaker::Agent, "second")]
        );
    }

    #[test]
    fn test_discard_drops_pending_text() {
        let mut assembler = TranscriptAssembler::default();
        assembler.push_fragment(TranscriptChannel::Input, "lost");
        assembler.discard();
        assert!(assembler.turn_complete().is_empty());
    }
}
