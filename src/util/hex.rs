/// Formats bytes the way the link's diagnostic surfaces display them:
///  uppercase, two digits per byte, bytes separated by single spaces.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Permissive hex parsing for operator-supplied raw frames: characters that are
///  not hex digits are skipped, and an odd number of digits means the leading
///  digit stands for a byte of its own ("1A2" parses as 01 A2). Input without
///  any hex digit yields an empty vec - callers treat that as invalid input.
pub fn parse_hex(input: &str) -> Vec<u8> {
    let digits: Vec<u32> = input.chars()
        .filter_map(|ch| ch.to_digit(16))
        .collect();

    let mut result = Vec::with_capacity((digits.len() + 1) / 2);
    let mut remaining = digits.as_slice();

    if remaining.len() % 2 == 1 {
        result.push(remaining[0] as u8);
        remaining = &remaining[1..];
    }
    for pair in remaining.chunks_exact(2) {
        result.push((pair[0] << 4 | pair[1]) as u8);
    }
    result
}
