//! Byte-offset → `(line, column)` resolution, used when a sub-fragment (a
//! template-literal `${…}` hole) is re-lexed and re-parsed independently of
//! the token stream that covers the rest of the source.

use crate::ast::Loc;

/// Computes the 1-based `(line, column)` of a byte offset into `source`.
pub fn loc_at(source: &str, offset: u32) -> Loc {
    let offset = offset as usize;
    let mut line = 1u32;
    let mut col = 1u32;
    for b in source.as_bytes().iter().take(offset) {
        if *b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    Loc { line, column: col }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_byte_is_line_one_column_one() {
        assert_eq!(loc_at("abc", 0), Loc { line: 1, column: 1 });
    }

    #[test]
    fn counts_newlines() {
        let src = "ab\ncd\nef";
        assert_eq!(loc_at(src, 6), Loc { line: 3, column: 1 });
        assert_eq!(loc_at(src, 7), Loc { line: 3, column: 2 });
    }
}
