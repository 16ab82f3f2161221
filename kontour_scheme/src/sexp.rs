use kontour::{Flonum, Identifier, KontourError, Position};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::fmt::{self, Display, Formatter};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct SExpParser;

/// A datum as read from source text. Quoted data keeps its `SExp` shape
/// all the way into evaluation, because each sub-datum's position is an
/// allocation site for the pairs it turns into.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SExp {
    pub pos: Position,
    pub kind: SExpKind,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum SExpKind {
    Bool(bool),
    Int(i64),
    Float(Flonum),
    Char(char),
    Str(String),
    Symbol(Identifier),
    List(Vec<SExp>),
}

impl SExp {
    pub fn symbol_name(&self) -> Option<Identifier> {
        match &self.kind {
            SExpKind::Symbol(name) => Some(*name),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[SExp]> {
        match &self.kind {
            SExpKind::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Display for SExp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SExpKind::Bool(true) => f.write_str("#t"),
            SExpKind::Bool(false) => f.write_str("#f"),
            SExpKind::Int(n) => write!(f, "{n}"),
            SExpKind::Float(x) => write!(f, "{x}"),
            SExpKind::Char(c) => write!(f, "#\\{c}"),
            SExpKind::Str(s) => write!(f, "\"{s}\""),
            SExpKind::Symbol(s) => write!(f, "{s}"),
            SExpKind::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Read a whole program: a sequence of data.
pub fn parse_program(source: &str) -> Result<Vec<SExp>, KontourError> {
    let mut pairs = SExpParser::parse(Rule::program, source).map_err(|e| {
        let position = match e.line_col {
            pest::error::LineColLocation::Pos((line, col))
            | pest::error::LineColLocation::Span((line, col), _) => {
                Position::new(line as u32, col as u32)
            }
        };
        KontourError::parse(position, e.variant.message())
    })?;
    let program = pairs.next().expect("grammar guarantees a program node");
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(read_sexp)
        .collect()
}

fn position_of(pair: &Pair<'_, Rule>) -> Position {
    let (line, col) = pair.as_span().start_pos().line_col();
    Position::new(line as u32, col as u32)
}

fn read_sexp(pair: Pair<'_, Rule>) -> Result<SExp, KontourError> {
    let pos = position_of(&pair);
    match pair.as_rule() {
        Rule::sexp => read_sexp(pair.into_inner().next().expect("sexp has one child")),
        Rule::list => {
            let items: Result<Vec<_>, _> = pair.into_inner().map(read_sexp).collect();
            Ok(SExp {
                pos,
                kind: SExpKind::List(items?),
            })
        }
        Rule::quoted => {
            let inner = read_sexp(pair.into_inner().next().expect("quoted datum"))?;
            Ok(SExp {
                pos,
                kind: SExpKind::List(vec![
                    SExp {
                        pos,
                        kind: SExpKind::Symbol(Identifier::new("quote")),
                    },
                    inner,
                ]),
            })
        }
        Rule::atom => read_sexp(pair.into_inner().next().expect("atom has one child")),
        Rule::boolean => Ok(SExp {
            pos,
            kind: SExpKind::Bool(pair.as_str() == "#t"),
        }),
        Rule::character => {
            let c = pair
                .as_str()
                .chars()
                .nth(2)
                .ok_or_else(|| KontourError::parse(pos, "empty character literal"))?;
            Ok(SExp {
                pos,
                kind: SExpKind::Char(c),
            })
        }
        Rule::string => {
            let raw = pair.as_str();
            Ok(SExp {
                pos,
                kind: SExpKind::Str(raw[1..raw.len() - 1].to_string()),
            })
        }
        Rule::number => {
            let text = pair.as_str();
            if text.contains('.') {
                let x: f64 = text
                    .parse()
                    .map_err(|_| KontourError::parse(pos, format!("bad float {text}")))?;
                Ok(SExp {
                    pos,
                    kind: SExpKind::Float(Flonum(x)),
                })
            } else {
                let n: i64 = text
                    .parse()
                    .map_err(|_| KontourError::parse(pos, format!("bad integer {text}")))?;
                Ok(SExp {
                    pos,
                    kind: SExpKind::Int(n),
                })
            }
        }
        Rule::symbol => Ok(SExp {
            pos,
            kind: SExpKind::Symbol(Identifier::new(pair.as_str())),
        }),
        rule => Err(KontourError::parse(pos, format!("unexpected rule {rule:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_atoms_and_lists() {
        let prog = parse_program("(+ 1 2.5 #t \"s\" foo)").unwrap();
        assert_eq!(prog.len(), 1);
        let items = prog[0].items().unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(items[0].symbol_name(), Some(Identifier::new("+")));
        assert_eq!(items[1].kind, SExpKind::Int(1));
        assert_eq!(items[2].kind, SExpKind::Float(Flonum(2.5)));
        assert_eq!(items[5].kind, SExpKind::Symbol(Identifier::new("foo")));
    }

    #[test]
    fn quote_expands_to_a_quote_form() {
        let prog = parse_program("'(a b)").unwrap();
        let items = prog[0].items().unwrap();
        assert_eq!(items[0].symbol_name(), Some(Identifier::new("quote")));
        assert_eq!(items[1].items().unwrap().len(), 2);
    }

    #[test]
    fn comments_and_negative_numbers() {
        let prog = parse_program("; header\n(- -7 x) ; trailing\n").unwrap();
        let items = prog[0].items().unwrap();
        assert_eq!(items[1].kind, SExpKind::Int(-7));
    }

    #[test]
    fn positions_are_line_and_column() {
        let prog = parse_program("(a\n  (b))").unwrap();
        let items = prog[0].items().unwrap();
        assert_eq!(items[0].pos, Position::new(1, 2));
        assert_eq!(items[1].pos, Position::new(2, 3));
    }

    #[test]
    fn unbalanced_parens_fail() {
        assert!(parse_program("(a (b)").is_err());
    }
}
