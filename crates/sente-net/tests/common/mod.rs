//! Shared helpers for sente-net integration tests.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;

const NI: usize = 361;

/// Render a small but complete weight file with deterministic values.
pub fn weight_text(version: u32, channels: usize, blocks: usize) -> String {
    let mut state = 0x2545_F491u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
    };
    let mut out = format!("{version}\n");
    let mut line = |n: usize, center: f32, spread: f32| {
        let values: Vec<String> = (0..n).map(|_| format!("{:.4}", center + spread * next())).collect();
        let _ = writeln!(out, "{}", values.join(" "));
    };
    let c = channels;

    let conv = |line: &mut dyn FnMut(usize, f32, f32), weights: usize, prelu: bool| {
        line(weights, 0.0, 0.2);
        line(c, 1.0, 0.1);
        line(c, 0.0, 0.05);
        line(c, 0.0, 0.05);
        line(c, 1.0, 0.4);
        if prelu {
            line(c, 0.25, 0.05);
        }
    };

    conv(&mut line, c * 29 * 9, true);
    for _ in 0..blocks {
        conv(&mut line, c * c * 9, true);
        conv(&mut line, c * c * 9, false);
        for _ in 0..4 {
            line(0, 0.0, 0.0);
        }
        line(c, 0.25, 0.05);
    }
    line(2 * c, 0.0, 0.5);
    line(2, 0.0, 0.1);
    line(2, 0.0, 0.05);
    line(2, 1.0, 0.4);
    line(2, 0.25, 0.05);
    line(2 * NI * (NI + 1), 0.0, 0.1);
    line(NI + 1, 0.0, 0.1);
    line(c, 0.0, 0.5);
    line(1, 0.0, 0.1);
    line(1, 0.0, 0.05);
    line(1, 1.0, 0.4);
    line(1, 0.25, 0.05);
    line(NI * 256, 0.0, 0.05);
    line(256, 0.0, 0.05);
    line(256, 0.0, 0.1);
    line(1, 0.0, 0.1);
    drop(line);
    out
}

/// Gzip `text`.
pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// A path in the temp directory unique to this process and `name`.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sente-net-{}-{name}", std::process::id()))
}

/// Replace 1-indexed line `number` of `text`.
pub fn replace_line(text: &str, number: usize, replacement: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, l)| if i + 1 == number { replacement } else { l })
        .collect::<Vec<_>>()
        .join("\n")
}
