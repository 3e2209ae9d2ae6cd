#![no_std]
#![no_main]
#![feature(alloc_error_handler)]

mod display;
mod flash;
mod midi;
mod peripherals;
mod sysex_io;

use panic_probe as _;

// RTIC app module runs the app as a set of concurrent tasks modifying shared state.
// This module is responsible for interfacing with the hardware; gridbeat_engine owns
// all the timing/sequencing/transfer logic and knows nothing about real peripherals.
#[rtic::app(
    device = rp_pico::hal::pac,
    peripherals = true,
    dispatchers = [USBCTRL_IRQ, DMA_IRQ_0, DMA_IRQ_1, PWM_IRQ_WRAP]
)]
mod app {
    use alloc_cortex_m::CortexMHeap;
    use cortex_m::singleton;
    use defmt::{self, debug, error, info, trace};
    use defmt_rtt as _;
    use fugit::MicrosDurationU64;
    use embedded_hal::digital::v2::InputPin;
    use gridbeat_engine::clock::{ClockSource, ExternalSyncInput, InternalClock, MidiClockProcessor};
    use gridbeat_engine::collaborators::{
        route_incoming_message, DisplaySink, MessageRouter, SoundRouter,
    };
    use gridbeat_engine::config::Config;
    use gridbeat_engine::event_loop::EventLoop;
    use gridbeat_engine::midi_io::{MidiOutputConsumer, MidiOutputProducer, OutQueue, OutgoingMidiMessage};
    use gridbeat_engine::rng::EntropySource;
    use gridbeat_engine::router::ClockRouter;
    use gridbeat_engine::sequencer::{NoteEvent, Sequencer, Step, Track};
    use gridbeat_engine::speed::{SpeedAdapter, SpeedModifier};
    use gridbeat_engine::tempo::TempoHandler;
    use gridbeat_engine::transfer::{
        build_handshake_frame, unwrap_sysex_frame, FirmwarePayloadHandler, PartitionManager,
        PartitionRegion, SysexDispatcher, TransferResponse,
    };
    use heapless::Vec;
    use midi_types::{MidiMessage, Note, Value7};
    use nb::block;
    use rp_pico::hal::{
        gpio::Interrupt::EdgeLow,
        timer::{monotonic::Monotonic, Alarm0},
    };

    use crate::display::{render_status, StatusSink, StatusSnapshot};
    use crate::flash::OnboardFlash;
    use crate::midi;
    use crate::peripherals::{setup, Display, MidiIn, MidiOut, SyncCablePin, SyncPulsePin};
    use crate::sysex_io::FlashSampleStore;

    #[global_allocator]
    static ALLOCATOR: CortexMHeap = CortexMHeap::empty();
    const HEAP_SIZE_BYTES: usize = 8 * 1024;

    // fine-grained enough to catch internal clock ticks at the fastest supported tempo
    // without falling multiple ticks behind between polls
    const TIMING_POLL_INTERVAL: MicrosDurationU64 = MicrosDurationU64::micros(500);
    const DISPLAY_UPDATE_INTERVAL: MicrosDurationU64 = MicrosDurationU64::millis(40);

    /// A/B firmware slots, sized generously relative to this firmware's own footprint.
    const FIRMWARE_SLOT_LENGTH: u32 = 512 * 1024;

    /// Base of the RP2040's execute-in-place flash window; running code's
    /// own address, minus this, is its offset into flash.
    const XIP_BASE: u32 = 0x1000_0000;

    /// Address of whichever function this is called from, used to find
    /// which A/B slot the currently-executing image was loaded from
    /// without depending on a linker symbol.
    fn running_address() -> u32 {
        running_address as *const () as u32
    }

    #[monotonic(binds = TIMER_IRQ_0, default = true)]
    type TimerMonotonic = Monotonic<Alarm0>;

    #[shared]
    struct Shared {
        event_loop: EventLoop,
        status: StatusSink,
        midi_out_producer: MidiOutputProducer<'static>,
        transfer_busy: bool,
    }

    #[local]
    struct Local {
        midi_in: MidiIn,
        midi_out: MidiOut,
        display: Display,
        sync_pulse_pin: SyncPulsePin,
        sync_cable_pin: SyncCablePin,
        midi_out_consumer: MidiOutputConsumer<'static>,
        sysex: SysexDispatcher<'static, FlashSampleStore, OnboardFlash>,
    }

    /// Forwards sequencer note triggers out as MIDI note-on messages; the
    /// onboard audio voice engine that actually produces sound from the
    /// pads lives outside this crate and subscribes to the same trigger.
    struct MidiEchoRouter<'a> {
        producer: &'a mut MidiOutputProducer<'static>,
    }

    impl<'a> SoundRouter for MidiEchoRouter<'a> {
        fn trigger(&mut self, event: NoteEvent) {
            let message = MidiMessage::NoteOn(event.channel, event.note, event.velocity);
            let _ = self.producer.enqueue(OutgoingMidiMessage::Typed(message));
        }
    }

    /// Logs inbound channel-voice messages; the pad/voice allocation that
    /// would actually act on them lives outside this crate.
    struct DefmtMessageRouter;

    impl MessageRouter for DefmtMessageRouter {
        fn note_on(&mut self, note: Note, velocity: Value7) {
            trace!(
                "[midi in] note on note={} vel={}",
                u8::from(note),
                u8::from(velocity)
            );
        }

        fn note_off(&mut self, note: Note, velocity: Value7) {
            trace!(
                "[midi in] note off note={} vel={}",
                u8::from(note),
                u8::from(velocity)
            );
        }

        fn control_change(&mut self, control: u8, value: Value7) {
            trace!("[midi in] cc control={} value={}", control, u8::from(value));
        }
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local, init::Monotonics) {
        info!("[init] hello world!");

        unsafe {
            ALLOCATOR.init(cortex_m_rt::heap_start() as usize, HEAP_SIZE_BYTES);
            debug!(
                "[init] heap_start={} heap_size_bytes={}",
                cortex_m_rt::heap_start() as usize,
                HEAP_SIZE_BYTES
            );
        }

        defmt::timestamp!("{=u64:us}", {
            monotonics::now().duration_since_epoch().to_micros()
        });

        let (midi_in, midi_out, mut display, sync_pulse_pin, sync_cable_pin, flash, rosc, monotonic_timer) =
            setup(ctx.device);

        let config = Config::default();
        let entropy = EntropySource::new(rosc);

        let mut tracks = [Track::new(0), Track::new(1), Track::new(2), Track::new(3)];
        tracks[0].set_step(0, Some(Step::new(36, 100)));
        tracks[0].set_step(4, Some(Step::new(36, 100)));
        tracks[1].set_step(2, Some(Step::new(38, 110)));
        tracks[1].set_step(6, Some(Step::new(38, 110)));

        let event_loop = EventLoop {
            router: ClockRouter::new(ClockSource::Internal),
            sync_in: ExternalSyncInput::new(),
            internal_clock: InternalClock::new(config.default_bpm),
            midi_clock: MidiClockProcessor::new(),
            speed: SpeedAdapter::new(SpeedModifier::NormalSpeed),
            tempo: TempoHandler::new(ClockSource::Internal, false),
            sequencer: Sequencer::new(tracks),
            entropy,
            midi_channel: config.midi_channel,
        };

        let out_queue: &'static mut OutQueue = singleton!(: OutQueue = OutQueue::new()).unwrap();
        let (out_producer, out_consumer) = out_queue.split();

        let running_offset = running_address().wrapping_sub(XIP_BASE);
        let active_slot_is_a = running_offset < FIRMWARE_SLOT_LENGTH;
        debug!(
            "[init] running_offset={} active_slot_is_a={}",
            running_offset, active_slot_is_a
        );

        let partition_manager: &'static mut PartitionManager =
            singleton!(: PartitionManager = PartitionManager::new(
                PartitionRegion { offset: 0, length: FIRMWARE_SLOT_LENGTH },
                PartitionRegion { offset: FIRMWARE_SLOT_LENGTH, length: FIRMWARE_SLOT_LENGTH },
                active_slot_is_a,
            ))
            .unwrap();
        let flash_for_firmware: &'static mut OnboardFlash =
            singleton!(: OnboardFlash = flash).unwrap();
        let firmware_handler = FirmwarePayloadHandler::new(partition_manager, flash_for_firmware);
        let sysex = SysexDispatcher::new(FlashSampleStore::new(), firmware_handler);

        display::render_status(&mut display, StatusSnapshot::default()).ok();

        timing_poll::spawn().expect("timing_poll::spawn should succeed");
        update_display::spawn().expect("update_display::spawn should succeed");

        info!("[init] complete");

        (
            Shared {
                event_loop,
                status: StatusSink::default(),
                midi_out_producer: MidiOutputProducer::new(out_producer),
                transfer_busy: false,
            },
            Local {
                midi_in,
                midi_out,
                display,
                sync_pulse_pin,
                sync_cable_pin,
                midi_out_consumer: MidiOutputConsumer::new(out_consumer),
                sysex,
            },
            init::Monotonics(monotonic_timer),
        )
    }

    /// Handle MIDI input. Triggered by a byte being received on UART0;
    /// reads one message at a time off the DIN MIDI in port.
    #[task(
        binds = UART0_IRQ,
        priority = 4,
        shared = [event_loop, midi_out_producer, transfer_busy],
        local = [midi_in]
    )]
    fn uart0_irq(mut ctx: uart0_irq::Context) {
        let start = monotonics::now();
        trace!("[uart0_irq] start");

        if let Ok(message) = block!(ctx.local.midi_in.read()) {
            let now_us = monotonics::now().duration_since_epoch().to_micros() as u32;
            let busy = ctx.shared.transfer_busy.lock(|busy| *busy);
            (ctx.shared.event_loop, ctx.shared.midi_out_producer).lock(|event_loop, producer| {
                match message {
                    MidiMessage::TimingClock => {
                        let tick = event_loop.midi_clock.on_midi_clock_tick_received(now_us);
                        let mut router = MidiEchoRouter { producer };
                        event_loop.on_raw_tick(tick, &mut router);
                        if event_loop.midi_clock.forward_echo_enabled() {
                            let _ = producer.enqueue(OutgoingMidiMessage::Typed(MidiMessage::TimingClock));
                        }
                    }
                    MidiMessage::Start | MidiMessage::Continue => {
                        info!("[midi] start/continue");
                        event_loop.tempo.start();
                        event_loop.sequencer.start();
                    }
                    MidiMessage::Stop => {
                        info!("[midi] stop");
                        event_loop.tempo.stop();
                        let offs = event_loop.sequencer.stop();
                        for off in offs {
                            let mut router = MidiEchoRouter { producer };
                            router.trigger(off);
                        }
                    }
                    other => {
                        let mut router = DefmtMessageRouter;
                        route_incoming_message(&mut router, &other, event_loop.midi_channel, busy);
                    }
                }
            });
        }

        trace!(
            "[uart0_irq] elapsed_time={}",
            (monotonics::now() - start).to_micros()
        );
    }

    /// Drains the outgoing MIDI queue under the non-realtime rate limit.
    #[task(priority = 3, capacity = 64, local = [midi_out, midi_out_consumer])]
    fn midi_send(ctx: midi_send::Context) {
        let now_us = monotonics::now().duration_since_epoch().to_micros() as u32;
        if let Some(message) = ctx.local.midi_out_consumer.poll(now_us) {
            match message {
                OutgoingMidiMessage::Typed(m) => {
                    midi::log_message(&m);
                    ctx.local
                        .midi_out
                        .write(&m)
                        .expect("midi_out.write(message) should succeed");
                }
                OutgoingMidiMessage::SysEx(bytes) => {
                    // Transfer ACK/NAK/data replies travel over whichever
                    // transport assembled the inbound frame (the DIN port
                    // here carries typed channel/realtime messages only).
                    trace!("[midi_send] dropping {} byte sysex reply, no raw transport wired", bytes.len());
                }
            }
        }
        midi_send::spawn_after(MicrosDurationU64::micros(200)).ok();
    }

    /// Pin interrupt for the analog 2 PPQN sync input and its cable-detect
    /// sense line.
    #[task(
        binds = IO_IRQ_BANK0,
        priority = 4,
        shared = [event_loop, midi_out_producer],
        local = [sync_pulse_pin, sync_cable_pin]
    )]
    fn io_irq_bank0(mut ctx: io_irq_bank0::Context) {
        let now_us = monotonics::now().duration_since_epoch().to_micros() as u32;

        if ctx.local.sync_pulse_pin.interrupt_status(EdgeLow) {
            (ctx.shared.event_loop, ctx.shared.midi_out_producer).lock(|event_loop, producer| {
                if let Some(pulse) = event_loop.sync_in.on_rising_edge(now_us) {
                    let mut router = MidiEchoRouter { producer };
                    event_loop.on_raw_tick(pulse, &mut router);
                }
            });
            ctx.local.sync_pulse_pin.clear_interrupt(EdgeLow);
        }

        if ctx.local.sync_cable_pin.interrupt_status(EdgeLow) {
            let present = ctx.local.sync_cable_pin.is_low().unwrap_or(false);
            ctx.shared.event_loop.lock(|event_loop| {
                event_loop.sync_in.set_cable_sensed(present, now_us);
            });
            ctx.local.sync_cable_pin.clear_interrupt(EdgeLow);
        }
    }

    /// Drives the internal clock, auto source-switching, and sequencer
    /// advance on a tight cooperative schedule.
    #[task(
        priority = 2,
        shared = [event_loop, status, midi_out_producer],
    )]
    fn timing_poll(ctx: timing_poll::Context) {
        let now_us = monotonics::now().duration_since_epoch().to_micros() as u32;

        (ctx.shared.event_loop, ctx.shared.status, ctx.shared.midi_out_producer).lock(
            |event_loop, status, producer| {
                let mut router = MidiEchoRouter { producer };
                let notes = event_loop.run_iteration(now_us, &mut router, status);
                if event_loop.tempo.should_send_midi_clock() {
                    let _ = producer.enqueue(OutgoingMidiMessage::Typed(MidiMessage::TimingClock));
                }
                let _ = notes;
            },
        );

        timing_poll::spawn_after(TIMING_POLL_INTERVAL).expect("timing_poll respawn should succeed");
    }

    /// Receives a fully-assembled raw SysEx frame (from whichever
    /// transport owns byte reassembly) and threads it through the
    /// sample/firmware transfer session, replying over the MIDI out
    /// queue.
    #[task(priority = 1, local = [sysex], shared = [midi_out_producer, transfer_busy], capacity = 4)]
    fn sysex_rx(mut ctx: sysex_rx::Context, frame: Vec<u8, 128>) {
        let Some((message_type, message_data)) = unwrap_sysex_frame(&frame) else {
            error!("[sysex_rx] malformed frame");
            return;
        };

        let (result, response) = ctx.local.sysex.process_message(message_type, message_data);
        debug!("[sysex_rx] result={}", defmt::Debug2Format(&result));
        let busy = ctx.local.sysex.is_busy();
        ctx.shared.transfer_busy.lock(|transfer_busy| *transfer_busy = busy);

        if response != TransferResponse::NoReply {
            let mut buf = [0u8; 6];
            let len = build_handshake_frame(&mut buf, response);
            if len > 0 {
                let mut payload: Vec<u8, 128> = Vec::new();
                let _ = payload.extend_from_slice(&buf[..len]);
                ctx.shared.midi_out_producer.lock(|producer| {
                    let _ = producer.enqueue(OutgoingMidiMessage::SysEx(payload));
                });
            }
        }
    }

    /// Renders the current playback state/BPM to the OLED. Split from the
    /// polling task so slow I2C traffic never delays timing-critical work.
    #[task(priority = 1, shared = [status], local = [display])]
    fn update_display(ctx: update_display::Context) {
        let snapshot = ctx.shared.status.lock(|status| status.snapshot);
        if render_status(ctx.local.display, snapshot).is_err() {
            error!("[update_display] render error");
        }
        update_display::spawn_after(DISPLAY_UPDATE_INTERVAL).ok();
    }

    // idle task needed because default RTIC idle task calls wfi(), which breaks rtt
    #[idle]
    fn task_main(_: task_main::Context) -> ! {
        loop {
            cortex_m::asm::nop();
        }
    }

    #[alloc_error_handler]
    fn alloc_error(_layout: core::alloc::Layout) -> ! {
        error!("out of heap memory");
        panic!("out of heap memory");
    }
}
