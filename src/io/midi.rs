//! Standard MIDI File interchange — format 1 export with tempo and time
//! signature meta events, and import back into stems.

use std::collections::HashMap;

use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};

use crate::error::{Error, Result};
use crate::song::SongSpec;
use crate::stem::{sort_notes, Instrument, Note, Stems};

/// Export tick resolution.
const TICKS_PER_BEAT: u32 = 960;

/// A song reconstructed from a Standard MIDI File.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSong {
    pub tempo_bpm: f64,
    /// (numerator, denominator).
    pub meter: (u8, u8),
    pub stems: Stems,
}

/// Serialize stems as a format-1 SMF: track 0 carries tempo and time
/// signature, then one track per instrument.
pub fn export_smf(spec: &SongSpec, stems: &Stems) -> Result<Vec<u8>> {
    let meter = spec.parsed_meter()?;
    let spb = spec.seconds_per_beat();
    let to_tick = |secs: f64| (secs / spb * TICKS_PER_BEAT as f64).round() as u64;

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_BEAT as u16)),
    ));

    let tempo_us = (60_000_000.0 / spec.tempo_bpm).round() as u32;
    let denominator_log2 = (meter.denominator as f64).log2().round() as u8;
    let mut conductor: Track = Vec::new();
    conductor.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_us))),
    });
    conductor.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
            meter.numerator as u8,
            denominator_log2,
            24,
            8,
        )),
    });
    conductor.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(conductor);

    for (&instrument, notes) in stems {
        // (tick, is_on, pitch, velocity); offs sort before ons at one tick.
        let mut moments: Vec<(u64, bool, u8, u8)> = Vec::with_capacity(notes.len() * 2);
        for note in notes {
            let on = to_tick(note.start);
            let off = to_tick(note.end()).max(on + 1);
            moments.push((on, true, note.pitch, note.vel));
            moments.push((off, false, note.pitch, 0));
        }
        moments.sort_by_key(|&(tick, is_on, pitch, _)| (tick, is_on, pitch));

        let channel = u4::new(instrument.channel());
        let mut track: Track = Vec::new();
        let mut cursor = 0u64;
        for (tick, is_on, pitch, vel) in moments {
            let delta = u28::new((tick - cursor) as u32);
            cursor = tick;
            let message = if is_on {
                MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(vel),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                }
            };
            track.push(TrackEvent {
                delta,
                kind: TrackEventKind::Midi { channel, message },
            });
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

/// Parse an SMF back into tempo, meter, and per-instrument stems. Channels
/// outside the engine's instrument mapping are ignored.
pub fn import_smf(bytes: &[u8]) -> Result<ImportedSong> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as f64,
        Timing::Timecode(..) => {
            return Err(Error::MidiImport("SMPTE timing is not supported".into()))
        }
    };

    let mut tempo_bpm = 120.0;
    let mut meter = (4u8, 4u8);
    let mut found_tempo = false;
    let mut found_meter = false;

    let mut stems = Stems::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        // FIFO of open notes per (channel, key), for overlapping repeats.
        let mut open: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in track {
            tick += u64::from(event.delta.as_int());
            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) if !found_tempo => {
                    tempo_bpm = 60_000_000.0 / us.as_int() as f64;
                    found_tempo = true;
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(n, d_log2, _, _))
                    if !found_meter =>
                {
                    meter = (*n, 1u8 << d_log2);
                    found_meter = true;
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((ch, key.as_int()))
                                .or_default()
                                .push((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let Some(instrument) = Instrument::from_channel(ch) else {
                                continue;
                            };
                            let Some((on_tick, vel)) = open
                                .get_mut(&(ch, key.as_int()))
                                .and_then(|stack| {
                                    (!stack.is_empty()).then(|| stack.remove(0))
                                })
                            else {
                                continue;
                            };
                            let spb = 60.0 / tempo_bpm;
                            let start = on_tick as f64 / ticks_per_beat * spb;
                            let end = tick as f64 / ticks_per_beat * spb;
                            stems.entry(instrument).or_default().push(Note {
                                start,
                                dur: (end - start).max(0.0),
                                pitch: key.as_int(),
                                vel,
                                channel: ch,
                            });
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    for notes in stems.values_mut() {
        sort_notes(notes);
    }
    if stems.is_empty() {
        return Err(Error::MidiImport("file contains no note events".into()));
    }
    Ok(ImportedSong {
        tempo_bpm,
        meter,
        stems,
    })
}
