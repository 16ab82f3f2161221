use crate::sexp::{SExp, SExpKind};
use kontour::{Expression, Flonum, Identifier, KontourError, Position};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// A Scheme expression. Nodes are shared behind `Arc` so closures and
/// frames clone cheaply; identity is structural.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SchemeExp {
    pub pos: Position,
    pub kind: Arc<ExpKind>,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Literal {
    Int(i64),
    Float(Flonum),
    Bool(bool),
    Char(char),
    Str(String),
}

/// One message handler of an `actor` form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Handler {
    pub tag: Identifier,
    pub params: Vec<Identifier>,
    pub body: SchemeExp,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ExpKind {
    Lit(Literal),
    Var(Identifier),
    Quote(SExp),
    Lambda {
        params: Vec<Identifier>,
        body: SchemeExp,
    },
    If {
        cond: SchemeExp,
        cons: SchemeExp,
        alt: SchemeExp,
    },
    Let {
        bindings: Vec<(Identifier, SchemeExp)>,
        body: SchemeExp,
    },
    Letrec {
        bindings: Vec<(Identifier, SchemeExp)>,
        body: SchemeExp,
    },
    Set {
        var: Identifier,
        value: SchemeExp,
    },
    Begin {
        exps: Vec<SchemeExp>,
    },
    And {
        exps: Vec<SchemeExp>,
    },
    Or {
        exps: Vec<SchemeExp>,
    },
    App {
        operator: SchemeExp,
        operands: Vec<SchemeExp>,
    },
    Spawn {
        body: SchemeExp,
    },
    JoinThread {
        thread: SchemeExp,
    },
    NewLock,
    Acquire {
        lock: SchemeExp,
    },
    Release {
        lock: SchemeExp,
    },
    ActorDef {
        name: Identifier,
        fields: Vec<Identifier>,
        handlers: Vec<Handler>,
    },
    Create {
        behavior: SchemeExp,
        args: Vec<SchemeExp>,
    },
    SendMsg {
        target: SchemeExp,
        tag: Identifier,
        args: Vec<SchemeExp>,
    },
    Become {
        behavior: SchemeExp,
        args: Vec<SchemeExp>,
    },
    Terminate,
}

impl SchemeExp {
    pub fn new(pos: Position, kind: ExpKind) -> Self {
        SchemeExp {
            pos,
            kind: Arc::new(kind),
        }
    }

    fn lit(pos: Position, lit: Literal) -> Self {
        SchemeExp::new(pos, ExpKind::Lit(lit))
    }
}

impl Expression for SchemeExp {
    fn position(&self) -> Position {
        self.pos
    }
}

impl Display for SchemeExp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            ExpKind::Lit(Literal::Int(n)) => write!(f, "{n}"),
            ExpKind::Lit(Literal::Float(x)) => write!(f, "{x}"),
            ExpKind::Lit(Literal::Bool(true)) => f.write_str("#t"),
            ExpKind::Lit(Literal::Bool(false)) => f.write_str("#f"),
            ExpKind::Lit(Literal::Char(c)) => write!(f, "#\\{c}"),
            ExpKind::Lit(Literal::Str(s)) => write!(f, "\"{s}\""),
            ExpKind::Var(name) => write!(f, "{name}"),
            ExpKind::Quote(datum) => write!(f, "'{datum}"),
            ExpKind::Lambda { params, body } => {
                write!(f, "(lambda (")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") {body})")
            }
            ExpKind::If { cond, cons, alt } => write!(f, "(if {cond} {cons} {alt})"),
            ExpKind::Let { bindings, body } => write_let(f, "let", bindings, body),
            ExpKind::Letrec { bindings, body } => write_let(f, "letrec", bindings, body),
            ExpKind::Set { var, value } => write!(f, "(set! {var} {value})"),
            ExpKind::Begin { exps } => write_form(f, "begin", exps),
            ExpKind::And { exps } => write_form(f, "and", exps),
            ExpKind::Or { exps } => write_form(f, "or", exps),
            ExpKind::App { operator, operands } => {
                write!(f, "({operator}")?;
                for a in operands {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            ExpKind::Spawn { body } => write!(f, "(spawn {body})"),
            ExpKind::JoinThread { thread } => write!(f, "(join {thread})"),
            ExpKind::NewLock => f.write_str("(new-lock)"),
            ExpKind::Acquire { lock } => write!(f, "(acquire {lock})"),
            ExpKind::Release { lock } => write!(f, "(release {lock})"),
            ExpKind::ActorDef { name, .. } => write!(f, "(actor \"{name}\" …)"),
            ExpKind::Create { behavior, args } => {
                write!(f, "(create {behavior}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            ExpKind::SendMsg { target, tag, args } => {
                write!(f, "(send {target} {tag}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            ExpKind::Become { behavior, args } => {
                write!(f, "(become {behavior}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            ExpKind::Terminate => f.write_str("(terminate)"),
        }
    }
}

fn write_let(
    f: &mut Formatter<'_>,
    keyword: &str,
    bindings: &[(Identifier, SchemeExp)],
    body: &SchemeExp,
) -> fmt::Result {
    write!(f, "({keyword} (")?;
    for (i, (name, exp)) in bindings.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "({name} {exp})")?;
    }
    write!(f, ") {body})")
}

fn write_form(f: &mut Formatter<'_>, keyword: &str, exps: &[SchemeExp]) -> fmt::Result {
    write!(f, "({keyword}")?;
    for e in exps {
        write!(f, " {e}")?;
    }
    write!(f, ")")
}

/// Compile a whole program: leading and interleaved `define`s become one
/// `letrec` around the remaining expressions.
pub fn compile_program(data: &[SExp]) -> Result<SchemeExp, KontourError> {
    let mut bindings = Vec::new();
    let mut body = Vec::new();
    for sexp in data {
        match define_binding(sexp)? {
            Some(binding) => bindings.push(binding),
            None => body.push(compile(sexp)?),
        }
    }
    let pos = data
        .first()
        .map(|s| s.pos)
        .unwrap_or_else(Position::none);
    if body.is_empty() {
        return Err(KontourError::parse(pos, "program has no expression to evaluate"));
    }
    let body = if body.len() == 1 {
        body.pop().expect("just checked")
    } else {
        let first = body[0].pos;
        SchemeExp::new(first, ExpKind::Begin { exps: body })
    };
    if bindings.is_empty() {
        Ok(body)
    } else {
        Ok(SchemeExp::new(pos, ExpKind::Letrec { bindings, body }))
    }
}

/// `(define x e)` / `(define (f args…) body…)`, or `None` for a plain
/// expression.
fn define_binding(sexp: &SExp) -> Result<Option<(Identifier, SchemeExp)>, KontourError> {
    let Some(items) = sexp.items() else {
        return Ok(None);
    };
    if items.first().and_then(SExp::symbol_name) != Some(Identifier::new("define")) {
        return Ok(None);
    }
    match items {
        [_, target, rest @ ..] => match &target.kind {
            SExpKind::Symbol(name) => {
                let [value] = rest else {
                    return Err(KontourError::parse(sexp.pos, "define expects one value"));
                };
                Ok(Some((*name, compile(value)?)))
            }
            SExpKind::List(sig) => {
                let [fname, params @ ..] = sig.as_slice() else {
                    return Err(KontourError::parse(sexp.pos, "empty define signature"));
                };
                let name = fname
                    .symbol_name()
                    .ok_or_else(|| KontourError::parse(fname.pos, "function name must be a symbol"))?;
                let params = identifiers(params)?;
                let body = compile_body(sexp.pos, rest)?;
                Ok(Some((
                    name,
                    SchemeExp::new(target.pos, ExpKind::Lambda { params, body }),
                )))
            }
            _ => Err(KontourError::parse(sexp.pos, "malformed define")),
        },
        _ => Err(KontourError::parse(sexp.pos, "malformed define")),
    }
}

fn identifiers(sexps: &[SExp]) -> Result<Vec<Identifier>, KontourError> {
    sexps
        .iter()
        .map(|s| {
            s.symbol_name()
                .ok_or_else(|| KontourError::parse(s.pos, "expected a symbol"))
        })
        .collect()
}

fn compile_body(pos: Position, body: &[SExp]) -> Result<SchemeExp, KontourError> {
    match body {
        [] => Err(KontourError::parse(pos, "empty body")),
        [single] => compile(single),
        many => {
            let exps: Result<Vec<_>, _> = many.iter().map(compile).collect();
            Ok(SchemeExp::new(many[0].pos, ExpKind::Begin { exps: exps? }))
        }
    }
}

fn compile_all(sexps: &[SExp]) -> Result<Vec<SchemeExp>, KontourError> {
    sexps.iter().map(compile).collect()
}

fn compile_bindings(sexps: &[SExp]) -> Result<Vec<(Identifier, SchemeExp)>, KontourError> {
    sexps
        .iter()
        .map(|b| {
            let pair = b
                .items()
                .ok_or_else(|| KontourError::parse(b.pos, "binding must be a pair"))?;
            let [name, value] = pair else {
                return Err(KontourError::parse(b.pos, "binding must be (name value)"));
            };
            let name = name
                .symbol_name()
                .ok_or_else(|| KontourError::parse(name.pos, "binding name must be a symbol"))?;
            Ok((name, compile(value)?))
        })
        .collect()
}

/// Compile one expression.
pub fn compile(sexp: &SExp) -> Result<SchemeExp, KontourError> {
    let pos = sexp.pos;
    match &sexp.kind {
        SExpKind::Bool(b) => Ok(SchemeExp::lit(pos, Literal::Bool(*b))),
        SExpKind::Int(n) => Ok(SchemeExp::lit(pos, Literal::Int(*n))),
        SExpKind::Float(x) => Ok(SchemeExp::lit(pos, Literal::Float(*x))),
        SExpKind::Char(c) => Ok(SchemeExp::lit(pos, Literal::Char(*c))),
        SExpKind::Str(s) => Ok(SchemeExp::lit(pos, Literal::Str(s.clone()))),
        SExpKind::Symbol(name) => Ok(SchemeExp::new(pos, ExpKind::Var(*name))),
        SExpKind::List(items) => compile_list(pos, items),
    }
}

fn compile_list(pos: Position, items: &[SExp]) -> Result<SchemeExp, KontourError> {
    let [head, rest @ ..] = items else {
        return Err(KontourError::parse(pos, "empty application"));
    };
    let Some(keyword) = head.symbol_name() else {
        return compile_app(pos, head, rest);
    };
    match keyword.as_str() {
        "quote" => {
            let [datum] = rest else {
                return Err(KontourError::parse(pos, "quote expects one datum"));
            };
            Ok(SchemeExp::new(pos, ExpKind::Quote(datum.clone())))
        }
        "lambda" => {
            let [params, body @ ..] = rest else {
                return Err(KontourError::parse(pos, "malformed lambda"));
            };
            let params = identifiers(
                params
                    .items()
                    .ok_or_else(|| KontourError::parse(params.pos, "lambda parameter list"))?,
            )?;
            Ok(SchemeExp::new(
                pos,
                ExpKind::Lambda {
                    params,
                    body: compile_body(pos, body)?,
                },
            ))
        }
        "if" => match rest {
            [cond, cons] => Ok(SchemeExp::new(
                pos,
                ExpKind::If {
                    cond: compile(cond)?,
                    cons: compile(cons)?,
                    alt: SchemeExp::lit(pos, Literal::Bool(false)),
                },
            )),
            [cond, cons, alt] => Ok(SchemeExp::new(
                pos,
                ExpKind::If {
                    cond: compile(cond)?,
                    cons: compile(cons)?,
                    alt: compile(alt)?,
                },
            )),
            _ => Err(KontourError::parse(pos, "malformed if")),
        },
        "cond" => compile_cond(pos, rest),
        "let" => match rest {
            // named let: loop syntax sugar over letrec
            [name, bindings, body @ ..] if name.symbol_name().is_some() => {
                let loop_name = name.symbol_name().expect("guard");
                let bindings = compile_bindings(
                    bindings
                        .items()
                        .ok_or_else(|| KontourError::parse(bindings.pos, "let bindings"))?,
                )?;
                let (params, inits): (Vec<_>, Vec<_>) = bindings.into_iter().unzip();
                let lambda = SchemeExp::new(
                    name.pos,
                    ExpKind::Lambda {
                        params,
                        body: compile_body(pos, body)?,
                    },
                );
                let call = SchemeExp::new(
                    pos,
                    ExpKind::App {
                        operator: SchemeExp::new(name.pos, ExpKind::Var(loop_name)),
                        operands: inits,
                    },
                );
                Ok(SchemeExp::new(
                    pos,
                    ExpKind::Letrec {
                        bindings: vec![(loop_name, lambda)],
                        body: call,
                    },
                ))
            }
            [bindings, body @ ..] => Ok(SchemeExp::new(
                pos,
                ExpKind::Let {
                    bindings: compile_bindings(
                        bindings
                            .items()
                            .ok_or_else(|| KontourError::parse(bindings.pos, "let bindings"))?,
                    )?,
                    body: compile_body(pos, body)?,
                },
            )),
            _ => Err(KontourError::parse(pos, "malformed let")),
        },
        "let*" => {
            let [bindings, body @ ..] = rest else {
                return Err(KontourError::parse(pos, "malformed let*"));
            };
            let bindings = compile_bindings(
                bindings
                    .items()
                    .ok_or_else(|| KontourError::parse(bindings.pos, "let* bindings"))?,
            )?;
            let mut out = compile_body(pos, body)?;
            for (name, value) in bindings.into_iter().rev() {
                out = SchemeExp::new(
                    pos,
                    ExpKind::Let {
                        bindings: vec![(name, value)],
                        body: out,
                    },
                );
            }
            Ok(out)
        }
        "letrec" => {
            let [bindings, body @ ..] = rest else {
                return Err(KontourError::parse(pos, "malformed letrec"));
            };
            Ok(SchemeExp::new(
                pos,
                ExpKind::Letrec {
                    bindings: compile_bindings(
                        bindings
                            .items()
                            .ok_or_else(|| KontourError::parse(bindings.pos, "letrec bindings"))?,
                    )?,
                    body: compile_body(pos, body)?,
                },
            ))
        }
        "set!" => {
            let [var, value] = rest else {
                return Err(KontourError::parse(pos, "malformed set!"));
            };
            Ok(SchemeExp::new(
                pos,
                ExpKind::Set {
                    var: var
                        .symbol_name()
                        .ok_or_else(|| KontourError::parse(var.pos, "set! target"))?,
                    value: compile(value)?,
                },
            ))
        }
        "begin" => Ok(SchemeExp::new(
            pos,
            ExpKind::Begin {
                exps: if rest.is_empty() {
                    vec![SchemeExp::lit(pos, Literal::Bool(false))]
                } else {
                    compile_all(rest)?
                },
            },
        )),
        "and" => Ok(SchemeExp::new(pos, ExpKind::And { exps: compile_all(rest)? })),
        "or" => Ok(SchemeExp::new(pos, ExpKind::Or { exps: compile_all(rest)? })),
        "spawn" => {
            let body = compile_body(pos, rest)?;
            Ok(SchemeExp::new(pos, ExpKind::Spawn { body }))
        }
        "join" => {
            let [thread] = rest else {
                return Err(KontourError::parse(pos, "join expects one thread"));
            };
            Ok(SchemeExp::new(
                pos,
                ExpKind::JoinThread {
                    thread: compile(thread)?,
                },
            ))
        }
        "new-lock" => {
            if !rest.is_empty() {
                return Err(KontourError::parse(pos, "new-lock takes no arguments"));
            }
            Ok(SchemeExp::new(pos, ExpKind::NewLock))
        }
        "acquire" => {
            let [lock] = rest else {
                return Err(KontourError::parse(pos, "acquire expects one lock"));
            };
            Ok(SchemeExp::new(pos, ExpKind::Acquire { lock: compile(lock)? }))
        }
        "release" => {
            let [lock] = rest else {
                return Err(KontourError::parse(pos, "release expects one lock"));
            };
            Ok(SchemeExp::new(pos, ExpKind::Release { lock: compile(lock)? }))
        }
        "actor" => compile_actor(pos, rest),
        "create" => {
            let [behavior, args @ ..] = rest else {
                return Err(KontourError::parse(pos, "create expects a behavior"));
            };
            Ok(SchemeExp::new(
                pos,
                ExpKind::Create {
                    behavior: compile(behavior)?,
                    args: compile_all(args)?,
                },
            ))
        }
        "send" => {
            let [target, tag, args @ ..] = rest else {
                return Err(KontourError::parse(pos, "send expects a target and a tag"));
            };
            Ok(SchemeExp::new(
                pos,
                ExpKind::SendMsg {
                    target: compile(target)?,
                    tag: tag
                        .symbol_name()
                        .ok_or_else(|| KontourError::parse(tag.pos, "message tag"))?,
                    args: compile_all(args)?,
                },
            ))
        }
        "become" => {
            let [behavior, args @ ..] = rest else {
                return Err(KontourError::parse(pos, "become expects a behavior"));
            };
            Ok(SchemeExp::new(
                pos,
                ExpKind::Become {
                    behavior: compile(behavior)?,
                    args: compile_all(args)?,
                },
            ))
        }
        "terminate" => {
            if !rest.is_empty() {
                return Err(KontourError::parse(pos, "terminate takes no arguments"));
            }
            Ok(SchemeExp::new(pos, ExpKind::Terminate))
        }
        "define" => Err(KontourError::parse(
            pos,
            "define is only allowed at the top level",
        )),
        _ => compile_app(pos, head, rest),
    }
}

fn compile_app(pos: Position, head: &SExp, rest: &[SExp]) -> Result<SchemeExp, KontourError> {
    Ok(SchemeExp::new(
        pos,
        ExpKind::App {
            operator: compile(head)?,
            operands: compile_all(rest)?,
        },
    ))
}

fn compile_cond(pos: Position, clauses: &[SExp]) -> Result<SchemeExp, KontourError> {
    let mut out = SchemeExp::lit(pos, Literal::Bool(false));
    for clause in clauses.iter().rev() {
        let items = clause
            .items()
            .ok_or_else(|| KontourError::parse(clause.pos, "cond clause"))?;
        let [test, body @ ..] = items else {
            return Err(KontourError::parse(clause.pos, "empty cond clause"));
        };
        if test.symbol_name() == Some(Identifier::new("else")) {
            out = compile_body(clause.pos, body)?;
        } else {
            out = SchemeExp::new(
                clause.pos,
                ExpKind::If {
                    cond: compile(test)?,
                    cons: compile_body(clause.pos, body)?,
                    alt: out,
                },
            );
        }
    }
    Ok(out)
}

/// `(actor "name" (field…) (tag (param…) body…)…)`
fn compile_actor(pos: Position, rest: &[SExp]) -> Result<SchemeExp, KontourError> {
    let [name, fields, handler_forms @ ..] = rest else {
        return Err(KontourError::parse(pos, "malformed actor"));
    };
    let name = match &name.kind {
        SExpKind::Str(s) => Identifier::new(s),
        SExpKind::Symbol(s) => *s,
        _ => return Err(KontourError::parse(name.pos, "actor name")),
    };
    let fields = identifiers(
        fields
            .items()
            .ok_or_else(|| KontourError::parse(fields.pos, "actor field list"))?,
    )?;
    let mut handlers = Vec::new();
    for form in handler_forms {
        let items = form
            .items()
            .ok_or_else(|| KontourError::parse(form.pos, "actor handler"))?;
        let [tag, params, body @ ..] = items else {
            return Err(KontourError::parse(form.pos, "malformed handler"));
        };
        handlers.push(Handler {
            tag: tag
                .symbol_name()
                .ok_or_else(|| KontourError::parse(tag.pos, "handler tag"))?,
            params: identifiers(
                params
                    .items()
                    .ok_or_else(|| KontourError::parse(params.pos, "handler parameters"))?,
            )?,
            body: compile_body(form.pos, body)?,
        });
    }
    Ok(SchemeExp::new(
        pos,
        ExpKind::ActorDef {
            name,
            fields,
            handlers,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp::parse_program;

    fn compile_one(src: &str) -> SchemeExp {
        compile_program(&parse_program(src).unwrap()).unwrap()
    }

    #[test]
    fn defines_become_a_letrec() {
        let e = compile_one("(define (id x) x) (id 1)");
        let ExpKind::Letrec { bindings, body } = e.kind.as_ref() else {
            panic!("expected letrec, got {e}");
        };
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, Identifier::new("id"));
        assert!(matches!(body.kind.as_ref(), ExpKind::App { .. }));
    }

    #[test]
    fn named_let_desugars_to_letrec() {
        let e = compile_one("(let loop ((n 0)) (if (< n 3) (loop (+ n 1)) n))");
        let ExpKind::Letrec { bindings, body } = e.kind.as_ref() else {
            panic!("expected letrec");
        };
        assert_eq!(bindings[0].0, Identifier::new("loop"));
        assert!(matches!(body.kind.as_ref(), ExpKind::App { .. }));
    }

    #[test]
    fn let_star_nests() {
        let e = compile_one("(let* ((a 1) (b a)) b)");
        let ExpKind::Let { bindings, body } = e.kind.as_ref() else {
            panic!("expected let");
        };
        assert_eq!(bindings.len(), 1);
        assert!(matches!(body.kind.as_ref(), ExpKind::Let { .. }));
    }

    #[test]
    fn two_arm_if_gets_false_alternative() {
        let e = compile_one("(if x 1)");
        let ExpKind::If { alt, .. } = e.kind.as_ref() else {
            panic!("expected if");
        };
        assert!(matches!(alt.kind.as_ref(), ExpKind::Lit(Literal::Bool(false))));
    }

    #[test]
    fn actor_form_compiles() {
        let e = compile_one("(actor \"cell\" (v) (get (from) (send from value v)))");
        let ExpKind::ActorDef {
            name,
            fields,
            handlers,
        } = e.kind.as_ref()
        else {
            panic!("expected actor definition");
        };
        assert_eq!(*name, Identifier::new("cell"));
        assert_eq!(fields.len(), 1);
        assert_eq!(handlers[0].tag, Identifier::new("get"));
        assert_eq!(handlers[0].params.len(), 1);
    }

    #[test]
    fn rendering_round_trips_structure() {
        let e = compile_one("(let ((x 1)) (+ x 2))");
        assert_eq!(e.to_string(), "(let ((x 1)) (+ x 2))");
    }
}
