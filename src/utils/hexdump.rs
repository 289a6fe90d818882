use std::fmt::Write;

/// Renders `data` in the canonical hex display (`hexdump -C` style).
///
/// Every line shows the address (`offset` plus the position within `data`) in hexadecimal,
/// followed by sixteen space-separated two-column hex bytes, followed by the same sixteen bytes
/// as printable characters enclosed in `|` characters. Control and non-ASCII bytes are rendered
/// as `.`.
pub fn format_hexdump(data: &[u8], offset: usize) -> String {
    let mut out = String::with_capacity((data.len() / 16 + 1) * 78);

    for (i, line) in data.chunks(16).enumerate() {
        let address = offset + i * 16;
        // Writing to a `String` cannot fail.
        let _ = write!(out, "{:08x}: ", address);

        for b in line {
            let _ = write!(out, " {:02x}", b);
        }

        // align
        for _ in line.len()..16 {
            out.push_str("   ");
        }

        out.push_str("  |");
        for &c in line {
            if c.is_ascii_graphic() || c == b' ' {
                out.push(c as char);
            } else {
                out.push('.');
            }
        }
        out.push_str("|\n");
    }

    out
}
