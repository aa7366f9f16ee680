/// Position of the first occurrence of `needle` in `haystack` at or after
/// `start`, or `None`.
///
/// An empty needle matches at `start` as long as `start` lies within the
/// haystack. A needle longer than the remaining haystack never matches.
pub fn find(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    let rest = haystack.get(start..)?;
    if needle.is_empty() {
        return Some(start);
    }
    if needle.len() > rest.len() {
        return None;
    }
    rest.windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| start + offset)
}
