use super::functions::Function;
use super::lexer::{tokenize, Token, TokenKind};
use super::ExpressionError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "&",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Literal(Value),
    Field(String),
    /// `$`
    Context,
    /// `$$`
    Root,
    /// Any other `$name` outside call position; always undefined
    Variable(String),
    Path(Box<Node>, Box<Node>),
    Filter(Box<Node>, Box<Node>),
    Array(Vec<Node>),
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Condition(Box<Node>, Box<Node>, Option<Box<Node>>),
    Call(Function, Vec<Node>),
}

const BP_CONDITION: u8 = 20;
const BP_OR: u8 = 25;
const BP_AND: u8 = 30;
const BP_COMPARE: u8 = 40;
const BP_ADDITIVE: u8 = 50;
const BP_MULTIPLICATIVE: u8 = 60;
const BP_UNARY: u8 = 70;
const BP_PATH: u8 = 75;
const BP_POSTFIX: u8 = 80;

/// Deepest syntax tree the parser will build. Parsing and evaluation both
/// recurse per level.
pub(crate) const MAX_DEPTH: usize = 256;

pub(crate) fn parse(source: &str) -> Result<Node, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };

    if parser.peek().kind == TokenKind::Eof {
        return Err(ExpressionError::syntax(0, "empty expression"));
    }

    let node = parser.expression(0)?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(ExpressionError::syntax(
            trailing.position,
            format!("unexpected token {}", describe(&trailing.kind)),
        ));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Tree depth of the node being built
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                token.position,
                format!(
                    "expected {} but found {}",
                    describe(&kind),
                    describe(&token.kind)
                ),
            ))
        }
    }

    fn descend(&mut self, position: usize) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::syntax(
                position,
                format!("expression is nested deeper than {MAX_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    fn expression(&mut self, rbp: u8) -> Result<Node, ExpressionError> {
        let entry_depth = self.depth;
        let token = self.advance();
        self.descend(token.position)?;
        let mut left = self.prefix(token)?;
        // Each infix step wraps `left` one level deeper
        while rbp < infix_binding_power(&self.peek().kind) {
            let token = self.advance();
            self.descend(token.position)?;
            left = self.infix(token, left)?;
        }
        self.depth = entry_depth;
        Ok(left)
    }

    fn prefix(&mut self, token: Token) -> Result<Node, ExpressionError> {
        match token.kind {
            TokenKind::Number(n) => Ok(Node::Literal(number_value(n))),
            TokenKind::Str(s) => Ok(Node::Literal(Value::String(s))),
            TokenKind::True => Ok(Node::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Node::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Node::Literal(Value::Null)),
            TokenKind::Name { name, .. } => Ok(Node::Field(name)),
            TokenKind::Variable(name) => match name.as_str() {
                "" => Ok(Node::Context),
                "$" => Ok(Node::Root),
                _ if self.peek().kind == TokenKind::LParen => {
                    self.advance();
                    self.call(name, token.position)
                }
                _ => Ok(Node::Variable(name)),
            },
            TokenKind::Minus => Ok(Node::Negate(Box::new(self.expression(BP_UNARY)?))),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let items = self.list(TokenKind::RBracket)?;
                Ok(Node::Array(items))
            }
            other => Err(ExpressionError::syntax(
                token.position,
                format!("unexpected token {}", describe(&other)),
            )),
        }
    }

    fn infix(&mut self, token: Token, left: Node) -> Result<Node, ExpressionError> {
        match token.kind {
            TokenKind::Dot => {
                let right = self.expression(BP_PATH)?;
                Ok(Node::Path(Box::new(left), Box::new(right)))
            }
            TokenKind::LBracket => {
                let predicate = self.expression(0)?;
                self.expect(TokenKind::RBracket)?;
                Ok(Node::Filter(Box::new(left), Box::new(predicate)))
            }
            TokenKind::Question => {
                let then = self.expression(0)?;
                let otherwise = if self.peek().kind == TokenKind::Colon {
                    self.advance();
                    Some(Box::new(self.expression(0)?))
                } else {
                    None
                };
                Ok(Node::Condition(Box::new(left), Box::new(then), otherwise))
            }
            _ => {
                let (op, bp) = binary_operator(&token.kind).ok_or_else(|| unexpected(&token))?;
                let right = self.expression(bp)?;
                Ok(Node::Binary(op, Box::new(left), Box::new(right)))
            }
        }
    }

    fn call(&mut self, name: String, position: usize) -> Result<Node, ExpressionError> {
        let function = Function::lookup(&name).ok_or_else(|| {
            ExpressionError::syntax(position, format!("unknown function ${name}"))
        })?;
        let args = self.list(TokenKind::RParen)?;
        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(ExpressionError::syntax(
                position,
                format!(
                    "function ${name} takes {} but was given {}",
                    arity_text(min, max),
                    args.len()
                ),
            ));
        }
        Ok(Node::Call(function, args))
    }

    /// Comma separated expressions up to `close`, which is consumed
    fn list(&mut self, close: TokenKind) -> Result<Vec<Node>, ExpressionError> {
        let mut items = Vec::new();
        if self.peek().kind == close {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.expression(0)?);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }
}

fn binary_operator(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let op = match kind {
        TokenKind::Eq => (BinaryOp::Eq, BP_COMPARE),
        TokenKind::Ne => (BinaryOp::Ne, BP_COMPARE),
        TokenKind::Lt => (BinaryOp::Lt, BP_COMPARE),
        TokenKind::Le => (BinaryOp::Le, BP_COMPARE),
        TokenKind::Gt => (BinaryOp::Gt, BP_COMPARE),
        TokenKind::Ge => (BinaryOp::Ge, BP_COMPARE),
        TokenKind::Plus => (BinaryOp::Add, BP_ADDITIVE),
        TokenKind::Minus => (BinaryOp::Sub, BP_ADDITIVE),
        TokenKind::Amp => (BinaryOp::Concat, BP_ADDITIVE),
        TokenKind::Star => (BinaryOp::Mul, BP_MULTIPLICATIVE),
        TokenKind::Slash => (BinaryOp::Div, BP_MULTIPLICATIVE),
        TokenKind::Percent => (BinaryOp::Mod, BP_MULTIPLICATIVE),
        // Keywords only act as operators in infix position
        TokenKind::Name {
            name,
            quoted: false,
        } => match name.as_str() {
            "and" => (BinaryOp::And, BP_AND),
            "or" => (BinaryOp::Or, BP_OR),
            "in" => (BinaryOp::In, BP_COMPARE),
            _ => return None,
        },
        _ => return None,
    };
    Some(op)
}

fn infix_binding_power(kind: &TokenKind) -> u8 {
    match kind {
        TokenKind::Question => BP_CONDITION,
        TokenKind::Dot => BP_PATH,
        TokenKind::LBracket => BP_POSTFIX,
        other => binary_operator(other).map(|(_, bp)| bp).unwrap_or(0),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn arity_text(min: usize, max: usize) -> String {
    match (min, max) {
        (a, b) if a == b && a == 1 => "1 argument".to_string(),
        (a, b) if a == b => format!("{a} arguments"),
        (a, b) => format!("{a} to {b} arguments"),
    }
}

fn unexpected(token: &Token) -> ExpressionError {
    ExpressionError::syntax(
        token.position,
        format!("unexpected token {}", describe(&token.kind)),
    )
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Str(s) => format!("string \"{s}\""),
        TokenKind::Name { name, .. } => format!("name '{name}'"),
        TokenKind::Variable(name) => format!("'${name}'"),
        TokenKind::True => "'true'".to_string(),
        TokenKind::False => "'false'".to_string(),
        TokenKind::Null => "'null'".to_string(),
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Question => "'?'".to_string(),
        TokenKind::Colon => "':'".to_string(),
        TokenKind::Eq => "'='".to_string(),
        TokenKind::Ne => "'!='".to_string(),
        TokenKind::Lt => "'<'".to_string(),
        TokenKind::Le => "'<='".to_string(),
        TokenKind::Gt => "'>'".to_string(),
        TokenKind::Ge => "'>='".to_string(),
        TokenKind::Plus => "'+'".to_string(),
        TokenKind::Minus => "'-'".to_string(),
        TokenKind::Star => "'*'".to_string(),
        TokenKind::Slash => "'/'".to_string(),
        TokenKind::Percent => "'%'".to_string(),
        TokenKind::Amp => "'&'".to_string(),
        TokenKind::Eof => "end of expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> Box<Node> {
        Box::new(Node::Field(name.to_string()))
    }

    #[test]
    fn test_path_binds_tighter_than_comparison() {
        let node = parse("extract.v = true").unwrap();
        assert_eq!(
            node,
            Node::Binary(
                BinaryOp::Eq,
                Box::new(Node::Path(field("extract"), field("v"))),
                Box::new(Node::Literal(json!(true)))
            )
        );
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let node = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            node,
            Node::Binary(
                BinaryOp::Add,
                Box::new(Node::Literal(json!(1))),
                Box::new(Node::Binary(
                    BinaryOp::Mul,
                    Box::new(Node::Literal(json!(2))),
                    Box::new(Node::Literal(json!(3)))
                ))
            )
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let node = parse("a or b and c").unwrap();
        assert!(matches!(node, Node::Binary(BinaryOp::Or, _, ref rhs)
            if matches!(**rhs, Node::Binary(BinaryOp::And, _, _))));
    }

    #[test]
    fn test_filter_applies_to_step() {
        let node = parse("items.tags[0]").unwrap();
        assert_eq!(
            node,
            Node::Path(
                field("items"),
                Box::new(Node::Filter(field("tags"), Box::new(Node::Literal(json!(0)))))
            )
        );
    }

    #[test]
    fn test_condition_and_call() {
        let node = parse("$exists(a) ? 'yes' : 'no'").unwrap();
        match node {
            Node::Condition(cond, _, Some(_)) => {
                assert!(matches!(*cond, Node::Call(Function::Exists, ref args) if args.len() == 1))
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_quoted_keyword_is_a_field() {
        assert_eq!(parse("`and`").unwrap(), Node::Field("and".to_string()));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&parens).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { ref message, .. } if message.contains("nested")));

        let chain = vec!["1"; 100_000].join(" + ");
        assert!(parse(&chain).is_err());

        let negations = format!("{}1", "-".repeat(100_000));
        assert!(parse(&negations).is_err());

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse(&shallow).unwrap(), Node::Literal(json!(1)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("a = ").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("[1, 2").is_err());
    }

    #[test]
    fn test_unknown_function_is_compile_error() {
        match parse("$nope(a)") {
            Err(ExpressionError::Syntax { message, .. }) => {
                assert!(message.contains("unknown function $nope"))
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_arity_is_compile_error() {
        assert!(parse("$exists()").is_err());
        assert!(parse("$contains('a')").is_err());
    }
}
