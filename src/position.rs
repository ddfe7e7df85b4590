use crate::template::ast::Span;
use serde::Serialize;

/// 源码中的位置，行列均从 1 开始；列按字符计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// 半开区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// 行首偏移索引：把字节偏移换算成行列号
#[derive(Debug)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 超出末尾的偏移会被钳制到源码长度，落在多字节字符中间时向前取整
    pub fn position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.source.len());
        while !self.source.is_char_boundary(offset) {
            offset -= 1;
        }

        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..offset].chars().count() + 1;
        Position { line, column }
    }

    pub fn range(&self, span: Span) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_offset_is_line_one_column_one() {
        let index = LineIndex::new("abc");
        assert_eq!(index.position(0), Position { line: 1, column: 1 });
        assert_eq!(index.position(2), Position { line: 1, column: 3 });
    }

    #[test]
    fn offsets_after_newline_start_new_lines() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.position(2), Position { line: 1, column: 3 });
        assert_eq!(index.position(3), Position { line: 2, column: 1 });
        assert_eq!(index.position(6), Position { line: 3, column: 1 });
        assert_eq!(index.position(8), Position { line: 4, column: 2 });
    }

    #[test]
    fn columns_count_characters_not_bytes() {
        let index = LineIndex::new("héllo {x}");
        // "é" 占两个字节
        assert_eq!(index.position(7), Position { line: 1, column: 7 });
        assert_eq!(index.position(2), Position { line: 1, column: 2 });
    }

    #[test]
    fn out_of_range_offsets_clamp_to_end() {
        let index = LineIndex::new("ab");
        assert_eq!(index.position(99), Position { line: 1, column: 3 });
    }

    #[test]
    fn span_converts_to_range() {
        let index = LineIndex::new("a\n{x}");
        let range = index.range(Span::new(2, 5));
        assert_eq!(range.start, Position { line: 2, column: 1 });
        assert_eq!(range.end, Position { line: 2, column: 4 });
    }
}
