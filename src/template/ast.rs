/// 节点在源码中的字节区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 模板 AST 节点
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// 字面文本（已还原 `{{` / `}}` 转义）
    Text(TextNode),
    /// {path|filter:args}
    Placeholder(Placeholder),
    /// {> name}
    Include(Include),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(t) => t.span,
            Node::Placeholder(p) => p.span,
            Node::Include(i) => i.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub path: Vec<String>,
    pub filters: Vec<FilterCall>,
    pub span: Span,
}

impl Placeholder {
    /// 点路径的展示形式，如 `user.name`
    pub fn key(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub name: String,
    pub span: Span,
}

/// 按源码顺序排列的节点序列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateAst {
    pub nodes: Vec<Node>,
}

impl TemplateAst {
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Placeholder(p) => Some(p),
            _ => None,
        })
    }

    pub fn includes(&self) -> impl Iterator<Item = &Include> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Include(i) => Some(i),
            _ => None,
        })
    }
}
