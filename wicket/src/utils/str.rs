//! Byte-level splitting helpers for paths and header lists

use memchr::memchr_iter;

/// Splits `value` by `delimiter`, skipping empty pieces.
///
/// `"/users//{id}/"` split by `/` yields `users` and `{id}`.
#[inline]
pub(crate) fn split_nonempty(delimiter: u8, value: &[u8]) -> SplitNonEmpty<'_> {
    SplitNonEmpty {
        value,
        iter: memchr_iter(delimiter, value),
        last: 0,
    }
}

/// Splits a comma-separated header value into trimmed, non-empty tokens.
#[inline]
pub(crate) fn split_header_list(value: &str) -> impl Iterator<Item = &str> {
    split_nonempty(b',', value.as_bytes())
        .filter_map(|s| std::str::from_utf8(s).ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Iterator returned by [`split_nonempty`]
pub(crate) struct SplitNonEmpty<'a> {
    value: &'a [u8],
    iter: memchr::Memchr<'a>,
    last: usize,
}

impl<'a> Iterator for SplitNonEmpty<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        for pos in self.iter.by_ref() {
            let start = self.last;
            self.last = pos + 1;
            if pos > start {
                return Some(&self.value[start..pos]);
            }
        }

        let start = self.last;
        if start < self.value.len() {
            self.last = self.value.len();
            return Some(&self.value[start..]);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_splits_path_into_segments() {
        let parts = split_nonempty(b'/', b"/users//{id}/").collect::<Vec<_>>();

        assert_eq!(parts, vec![b"users".as_slice(), b"{id}".as_slice()]);
    }

    #[test]
    fn it_splits_root_path_into_nothing() {
        assert_eq!(split_nonempty(b'/', b"/").count(), 0);
        assert_eq!(split_nonempty(b'/', b"").count(), 0);
    }

    #[test]
    fn it_splits_header_list() {
        let parts = split_header_list(" chat, superchat ,,json").collect::<Vec<_>>();

        assert_eq!(parts, vec!["chat", "superchat", "json"]);
    }
}
