mod common;

use common::{booted, step_at, window_config, CONTROL_CHANNEL, HIGH, LOW, SAMPLE_CHANNEL};
use scope_acquisition::adc::InputMask;
use scope_acquisition::mailbox::Error;
use scope_acquisition::prelude::*;
use scope_acquisition::{
    AcquisitionConfig, Command, Edge, Layout, SampleWidth, Status, TriggerSettings,
};

#[test]
fn init_claims_channels_and_reports() {
    let (rig, mut controller) = common::rig(|_| LOW);
    assert!(rig.sim.listening());
    assert!(!rig.sim.converting());
    assert!(!rig.engine.is_running());
    assert_eq!(rig.chain.restart_address(), 0);

    let diagnostics = rig.handoff.diagnostics.read();
    assert_eq!(diagnostics.sample_channel, SAMPLE_CHANNEL);
    assert_eq!(diagnostics.control_channel, CONTROL_CHANNEL);
    assert!(!diagnostics.running);

    assert_eq!(controller.receive::<Status>(), Ok(Status::EngineStarted));
    assert!(!controller.has_message());
}

#[test]
fn trigger_with_history_gives_one_segment() {
    let (mut rig, mut controller) = booted(step_at(5));
    rig.start(&mut controller, window_config(), Command::StartContinuous);
    assert!(rig.sim.converting());

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::Contiguous {
            start: 3,
            length: 10,
            trigger_index: 2
        }
    );
    assert_eq!(result.first_channel, 0);
    assert_eq!(result.cycle, 1);

    let window = rig.window(&result);
    assert_eq!(&window[..2], &[LOW, LOW]);
    assert!(window[2..].iter().all(|&s| s == HIGH));

    // the writer is stopped once the window is published
    assert!(!rig.sim.converting());
    assert!(!rig.sim.sampling());
    assert!(!rig.engine.is_running());
    assert_eq!(rig.sim.chains(), 0);

    let diagnostics = rig.handoff.diagnostics.read();
    assert!(diagnostics.triggered);
    assert!(diagnostics.auto_stopped);
    assert_eq!(diagnostics.trigger_index, 5);
    assert_eq!(diagnostics.second_cycle, 0);
}

#[test]
fn no_edge_falls_back_to_the_buffer_head() {
    let (mut rig, mut controller) = booted(|position| (position as u16) % 3);
    rig.start(&mut controller, window_config(), Command::StartContinuous);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(result.layout, Layout::Untriggered { length: 10 });
    assert_eq!(result.layout.trigger_index(), 0);
    assert_eq!(rig.window(&result), [0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);

    let diagnostics = rig.handoff.diagnostics.read();
    assert!(!diagnostics.triggered);
    assert!(diagnostics.auto_stopped);
}

#[test]
fn early_trigger_after_a_wrap_takes_history_from_the_tail() {
    // the edge lands on index 1 of the second pass
    let (mut rig, mut controller) = booted(step_at(17));
    rig.start(&mut controller, window_config(), Command::StartSingleShot);
    assert_eq!(rig.chain.restart_address(), rig.buffer.address());

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::BackwardWrap {
            tail_start: 15,
            tail_length: 1,
            head_length: 9,
            trigger_index: 2
        }
    );
    let window = rig.window(&result);
    assert_eq!(&window[..2], &[LOW, LOW]);
    assert!(window[2..].iter().all(|&s| s == HIGH));

    assert_eq!(rig.sim.chains(), 1);
    let diagnostics = rig.handoff.diagnostics.read();
    assert_eq!(diagnostics.passes, 1);
    assert_eq!(diagnostics.trigger_index, 1);
}

#[test]
fn late_trigger_continues_after_the_wrap() {
    // 3 samples are left in the pass after index 12, 5 more are taken from the head
    let (mut rig, mut controller) = booted(step_at(12));
    rig.start(&mut controller, window_config(), Command::StartSingleShot);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::ForwardWrap {
            tail_start: 11,
            tail_length: 5,
            head_length: 5,
            trigger_index: 2
        }
    );
    let window = rig.window(&result);
    assert_eq!(window.len(), 10);
    assert_eq!(window[0], LOW);
    assert!(window[1..].iter().all(|&s| s == HIGH));

    // the post-trigger count includes the edge sample again, so the window starts one sample
    // late and the edge sits just before the reported trigger index
    let trigger_index = result.layout.trigger_index();
    assert_eq!(trigger_index, 2);
    assert_eq!(window[trigger_index - 2], LOW);
    assert_eq!(window[trigger_index - 1], HIGH);

    // exactly one re-arm, and the interrupt nulled the restart address behind it
    assert_eq!(rig.sim.chains(), 1);
    assert_eq!(rig.chain.restart_address(), 0);
    let diagnostics = rig.handoff.diagnostics.read();
    assert_eq!(diagnostics.second_cycle, 5);
    assert_eq!(diagnostics.passes, 1);
}

#[test]
fn continuous_capture_can_also_wrap_forward() {
    // 12 samples leave 10 after the trigger; an edge on index 10 has only 5 of them left in
    // the pass
    let config = AcquisitionConfig::DEFAULT.samples(12);
    let (mut rig, mut controller) = booted(step_at(10));
    rig.start(&mut controller, config, Command::StartContinuous);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert!(matches!(result.layout, Layout::ForwardWrap { .. }));
    assert_eq!(result.layout.len(), 12);
    assert_eq!(rig.sim.chains(), 1);
}

#[test]
fn edge_found_after_the_channel_stopped_falls_back_to_the_head() {
    // the whole pass is written before the engine looks at it, so the restart address for a
    // second pass comes too late
    let config = AcquisitionConfig::DEFAULT.samples(12);
    let (mut rig, mut controller) = booted(step_at(10));
    rig.start(&mut controller, config, Command::StartContinuous);
    rig.sim.ticks(16);
    assert!(!rig.sim.sampling());
    assert_eq!(rig.sim.chains(), 1);

    rig.engine.poll().unwrap();
    assert_eq!(controller.receive::<Status>(), Ok(Status::CaptureDone));
    let result = rig.handoff.result.read();
    assert_eq!(result.layout, Layout::Untriggered { length: 12 });
    let window = rig.window(&result);
    assert!(window[..10].iter().all(|&s| s == LOW));
    assert_eq!(&window[10..], &[HIGH, HIGH]);

    assert!(!rig.engine.is_running());
    assert!(!rig.sim.converting());
    assert_eq!(rig.chain.restart_address(), 0);
    let diagnostics = rig.handoff.diagnostics.read();
    assert!(!diagnostics.triggered);
    assert!(!diagnostics.auto_stopped);
    assert_eq!(diagnostics.second_cycle, 0);
}

#[test]
fn history_must_be_in_the_buffer_before_the_first_wrap() {
    // the only edge comes before two samples of history exist
    let (mut rig, mut controller) = booted(step_at(1));
    rig.start(&mut controller, window_config(), Command::StartSingleShot);

    assert_eq!(rig.run_until_done(&mut controller, 100), None);
    assert!(rig.sim.chains() >= 5);
    assert!(rig.engine.is_running());
    assert!(!rig.handoff.diagnostics.read().triggered);
}

#[test]
fn falling_edge_trigger() {
    let mut trigger = TriggerSettings::DEFAULT;
    trigger.set_edge(Edge::Falling);
    let config = window_config().trigger(trigger);

    let (mut rig, mut controller) = booted(|position| if position < 6 { HIGH } else { LOW });
    rig.start(&mut controller, config, Command::StartContinuous);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::Contiguous {
            start: 4,
            length: 10,
            trigger_index: 2
        }
    );
}

#[test]
fn stop_abandons_the_capture_without_reporting() {
    let mut falling = TriggerSettings::DEFAULT;
    falling.set_edge(Edge::Falling);

    // a rising step never satisfies a falling trigger
    let (mut rig, mut controller) = booted(step_at(5));
    rig.start(&mut controller, window_config().trigger(falling), Command::StartSingleShot);
    for _ in 0..40 {
        rig.step();
    }
    assert!(rig.engine.is_running());

    controller.send(Command::Stop);
    for _ in 0..40 {
        rig.step();
    }
    assert!(!rig.engine.is_running());
    assert!(!rig.sim.converting());
    assert!(!rig.sim.sampling());
    assert_eq!(rig.chain.restart_address(), 0);
    assert!(!controller.has_message());
    assert!(!rig.handoff.diagnostics.read().running);

    // the next start is a fresh capture
    rig.start(&mut controller, window_config(), Command::StartContinuous);
    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::Contiguous {
            start: 3,
            length: 10,
            trigger_index: 2
        }
    );
    assert_eq!(result.cycle, 2);
}

#[test]
fn start_while_running_restarts_from_scratch() {
    let (mut rig, mut controller) = booted(step_at(5));
    rig.start(&mut controller, window_config(), Command::StartSingleShot);
    rig.sim.ticks(3);

    rig.start(&mut controller, window_config(), Command::StartContinuous);
    assert_eq!(rig.sim.resets(), 3);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(result.cycle, 2);
    assert!(matches!(result.layout, Layout::Contiguous { start: 3, .. }));
    assert!(!controller.has_message());
}

#[test]
fn only_trigger_channel_samples_are_compared() {
    // input 1 (odd positions) steps up at position 7, input 0 stays low
    let source = |position: usize| if position % 2 == 1 && position >= 7 { HIGH } else { LOW };

    let (mut rig, mut controller) = booted(source);
    let config = window_config().channels(2);
    rig.start(&mut controller, config, Command::StartContinuous);
    assert_eq!(rig.sim.round_robin(), InputMask::AIN0 | InputMask::AIN1);
    assert_eq!(rig.sim.input(), 0);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(result.layout, Layout::Untriggered { length: 10 });
    assert_eq!(result.channels, 2);

    let mut trigger = TriggerSettings::DEFAULT;
    trigger.set_channel(1);
    rig.start(&mut controller, config.trigger(trigger), Command::StartContinuous);
    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::Contiguous {
            start: 5,
            length: 10,
            trigger_index: 2
        }
    );
    assert_eq!(result.first_channel, 1);
}

#[test]
fn single_channel_compares_every_sample() {
    let source = |position: usize| if position % 2 == 1 && position >= 3 { HIGH } else { LOW };
    let (mut rig, mut controller) = booted(source);
    rig.start(&mut controller, window_config(), Command::StartContinuous);
    assert_eq!(rig.sim.round_robin(), InputMask::empty());

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert_eq!(
        result.layout,
        Layout::Contiguous {
            start: 1,
            length: 10,
            trigger_index: 2
        }
    );
}

#[test]
fn slow_polling_does_not_skip_the_edge() {
    let (mut rig, mut controller) = booted(step_at(5));
    rig.start(&mut controller, window_config(), Command::StartContinuous);

    // the whole window is written between two polls
    rig.sim.ticks(14);
    let result = rig.run_until_done(&mut controller, 10).unwrap();
    assert!(matches!(result.layout, Layout::Contiguous { start: 3, .. }));
}

#[test]
fn same_stream_gives_same_window() {
    let (mut rig, mut controller) = booted(step_at(21));
    let mut results = Vec::new();
    for _ in 0..3 {
        rig.start(&mut controller, window_config(), Command::StartSingleShot);
        let result = rig.run_until_done(&mut controller, 100).unwrap();
        results.push((result.layout, result.first_channel, rig.window(&result)));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn capture_applies_divider_and_width() {
    let config = window_config()
        .sample_rate(10.kHz(), scope_acquisition::clock::ADC_CLOCK)
        .sample_width(SampleWidth::U8);

    // 8-bit samples: 500 mV is 39 counts
    let (mut rig, mut controller) = booted(|position| if position >= 4 { 200 } else { 0 });
    rig.start(&mut controller, config, Command::StartContinuous);
    assert_eq!(rig.sim.divider(), config.divider);
    assert_eq!(rig.sim.divider().int_part(), 4800);
    assert!(rig.sim.fifo().unwrap().byte_shift);

    let result = rig.run_until_done(&mut controller, 100).unwrap();
    assert!(matches!(result.layout, Layout::Contiguous { start: 2, .. }));
}

#[test]
fn status_word_on_the_command_queue_is_an_error() {
    let (mut rig, mut controller) = booted(|_| LOW);
    controller.push_blocking(Status::CaptureDone.into());
    assert_eq!(rig.engine.poll(), Err(Error::UnexpectedWord(0x8000_0001)));
}

#[test]
#[should_panic(expected = "protocol violation")]
fn run_halts_on_protocol_violation() {
    let (rig, mut controller) = booted(|_| LOW);
    controller.push_blocking(0xdead_beef);
    rig.engine.run();
}
