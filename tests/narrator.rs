pub mod test_utils;

use sakhi_core::narrator::Narrator;
use sakhi_core::route_vector::RouteStep;
use test_utils::MockSpeech;

fn steps() -> Vec<RouteStep> {
    vec![
        RouteStep {
            index: 0,
            instruction: Some("Turn left onto Oak Street".to_owned()),
            distance_m: 120.0,
            target: None,
        },
        RouteStep {
            index: 1,
            instruction: None,
            distance_m: 300.0,
            target: None,
        },
    ]
}

#[test]
fn each_step_is_announced_exactly_once() {
    let mut narrator = Narrator::new(false);
    let mut speech = MockSpeech::default();
    let steps = steps();

    assert!(narrator.announce_step(true, false, &steps, 0, &mut speech));
    assert!(!narrator.announce_step(true, false, &steps, 0, &mut speech));
    assert!(narrator.announce_step(true, false, &steps, 1, &mut speech));

    assert_eq!(speech.spoken.len(), 2);
    assert_eq!(speech.spoken[0], "Turn left onto Oak Street");
    assert_eq!(narrator.last_spoken_step(), Some(1));
}

#[test]
fn pending_speech_is_cancelled_before_each_announcement() {
    let mut narrator = Narrator::new(false);
    let mut speech = MockSpeech::default();

    narrator.announce_step(true, false, &steps(), 0, &mut speech);
    assert_eq!(
        speech.calls,
        vec!["cancel".to_owned(), "speak:Turn left onto Oak Street".to_owned()]
    );
}

#[test]
fn missing_instruction_falls_back_to_generic_guidance() {
    let mut narrator = Narrator::new(false);
    let mut speech = MockSpeech::default();
    let steps = steps();

    // instruction-less step
    assert!(narrator.announce_step(true, false, &steps, 1, &mut speech));
    // index beyond the step list
    assert!(narrator.announce_step(true, false, &steps, 7, &mut speech));

    assert_eq!(speech.spoken, vec![
        "Continue on the current route".to_owned(),
        "Continue on the current route".to_owned(),
    ]);
}

#[test]
fn muted_paused_and_idle_suppress_narration() {
    let mut speech = MockSpeech::default();
    let steps = steps();

    let mut narrator = Narrator::new(true);
    assert!(!narrator.announce_step(true, false, &steps, 0, &mut speech));

    narrator.set_muted(false);
    assert!(!narrator.announce_step(false, false, &steps, 0, &mut speech));
    assert!(!narrator.announce_step(true, true, &steps, 0, &mut speech));
    assert!(speech.spoken.is_empty());

    // suppressed steps were never recorded as spoken
    assert!(narrator.announce_step(true, false, &steps, 0, &mut speech));
    assert_eq!(speech.spoken.len(), 1);
}

#[test]
fn reset_allows_renarration_of_the_first_step() {
    let mut narrator = Narrator::new(false);
    let mut speech = MockSpeech::default();
    let steps = steps();

    narrator.announce_step(true, false, &steps, 0, &mut speech);
    narrator.reset();
    assert_eq!(narrator.last_spoken_step(), None);
    assert!(narrator.announce_step(true, false, &steps, 0, &mut speech));
    assert_eq!(speech.spoken.len(), 2);
}
