use crate::exp::SchemeExp;
use kontour::lattice::JoinSemiLattice;
use kontour::value::VectorRef;
use kontour::{
    Address, Allocator, BinaryOperator, CellRole, Effect, EffectKind, Effects, Expression,
    Identifier, MayFail, SemanticError, Store, Timestamp, UnaryOperator, ValueDomain,
};

/// The primitive operators of the prelude. Each entry is interpreted by
/// [`apply_prim`]; the value lattice only sees primitive *names*, so the
/// table is the single point of truth for what a name does.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Prim {
    Add,
    Sub,
    Mul,
    Div,
    Quotient,
    Modulo,
    Remainder,
    NumEq,
    Lt,
    Le,
    Gt,
    Ge,
    IsZero,
    Unary(UnaryOperator),
    Cons,
    Car,
    Cdr,
    SetCar,
    SetCdr,
    MakeVector,
    VectorLit,
    VectorRead,
    VectorWrite,
    EqP,
    EqualP,
    StringAppend,
    Fail,
    Show,
    Newline,
}

pub(crate) const PRIMITIVES: &[(&str, Prim)] = &[
    ("+", Prim::Add),
    ("-", Prim::Sub),
    ("*", Prim::Mul),
    ("/", Prim::Div),
    ("quotient", Prim::Quotient),
    ("modulo", Prim::Modulo),
    ("remainder", Prim::Remainder),
    ("=", Prim::NumEq),
    ("<", Prim::Lt),
    ("<=", Prim::Le),
    (">", Prim::Gt),
    (">=", Prim::Ge),
    ("zero?", Prim::IsZero),
    ("not", Prim::Unary(UnaryOperator::Not)),
    ("null?", Prim::Unary(UnaryOperator::IsNull)),
    ("pair?", Prim::Unary(UnaryOperator::IsPair)),
    ("char?", Prim::Unary(UnaryOperator::IsChar)),
    ("symbol?", Prim::Unary(UnaryOperator::IsSymbol)),
    ("string?", Prim::Unary(UnaryOperator::IsString)),
    ("integer?", Prim::Unary(UnaryOperator::IsInteger)),
    ("real?", Prim::Unary(UnaryOperator::IsFloat)),
    ("boolean?", Prim::Unary(UnaryOperator::IsBoolean)),
    ("vector?", Prim::Unary(UnaryOperator::IsVector)),
    ("lock?", Prim::Unary(UnaryOperator::IsLock)),
    ("procedure?", Prim::Unary(UnaryOperator::IsProcedure)),
    ("ceiling", Prim::Unary(UnaryOperator::Ceiling)),
    ("round", Prim::Unary(UnaryOperator::Round)),
    ("random", Prim::Unary(UnaryOperator::Random)),
    ("string-length", Prim::Unary(UnaryOperator::StringLength)),
    ("number->string", Prim::Unary(UnaryOperator::NumberToString)),
    ("string->symbol", Prim::Unary(UnaryOperator::StringToSymbol)),
    ("symbol->string", Prim::Unary(UnaryOperator::SymbolToString)),
    ("vector-length", Prim::Unary(UnaryOperator::VectorLength)),
    ("cons", Prim::Cons),
    ("car", Prim::Car),
    ("cdr", Prim::Cdr),
    ("set-car!", Prim::SetCar),
    ("set-cdr!", Prim::SetCdr),
    ("make-vector", Prim::MakeVector),
    ("vector", Prim::VectorLit),
    ("vector-ref", Prim::VectorRead),
    ("vector-set!", Prim::VectorWrite),
    ("eq?", Prim::EqP),
    ("equal?", Prim::EqualP),
    ("string-append", Prim::StringAppend),
    ("error", Prim::Fail),
    ("display", Prim::Show),
    ("newline", Prim::Newline),
];

pub(crate) fn lookup(name: Identifier) -> Option<Prim> {
    PRIMITIVES
        .iter()
        .find(|(n, _)| *n == name.as_str())
        .map(|(_, p)| *p)
}

/// What applying a primitive produced: branched results, the store after
/// any allocation or mutation, and the touched addresses.
pub(crate) struct PrimOutcome<A: Address, V: JoinSemiLattice> {
    pub result: MayFail<V>,
    pub store: Store<A, V>,
    pub effects: Effects<A>,
}

fn arity_exact(name: Identifier, expected: usize, got: usize) -> Option<SemanticError> {
    (got != expected).then(|| SemanticError::ArityError {
        operator: name,
        expected,
        got,
    })
}

fn arity_at_least(name: Identifier, min: usize, got: usize) -> Option<SemanticError> {
    (got < min).then(|| SemanticError::VariadicArityError {
        operator: name,
        min,
        got,
    })
}

pub(crate) fn apply_prim<A, D, AL, T>(
    prim: Prim,
    name: Identifier,
    args: &[D::Value],
    fexp: &SchemeExp,
    domain: &D,
    alloc: &AL,
    store: Store<A, D::Value>,
    t: &T,
) -> PrimOutcome<A, D::Value>
where
    A: Address,
    D: ValueDomain<SchemeExp, A>,
    AL: Allocator<SchemeExp, D::Value, T, Addr = A>,
    T: Timestamp,
{
    let mut out = PrimOutcome {
        result: MayFail::empty(),
        store,
        effects: Effects::new(),
    };
    let arity_err = match prim {
        Prim::Add | Prim::Mul => None,
        Prim::Sub | Prim::Div => arity_at_least(name, 1, args.len()),
        Prim::Quotient
        | Prim::Modulo
        | Prim::Remainder
        | Prim::NumEq
        | Prim::Lt
        | Prim::Le
        | Prim::Gt
        | Prim::Ge
        | Prim::Cons
        | Prim::EqP
        | Prim::EqualP
        | Prim::StringAppend
        | Prim::VectorRead => arity_exact(name, 2, args.len()),
        Prim::IsZero | Prim::Unary(_) | Prim::Car | Prim::Cdr | Prim::Show => {
            arity_exact(name, 1, args.len())
        }
        Prim::SetCar | Prim::SetCdr => arity_exact(name, 2, args.len()),
        Prim::MakeVector => arity_at_least(name, 1, args.len())
            .or_else(|| (args.len() > 2).then(|| SemanticError::ArityError {
                operator: name,
                expected: 2,
                got: args.len(),
            })),
        Prim::VectorWrite => arity_exact(name, 3, args.len()),
        Prim::VectorLit | Prim::Fail => None,
        Prim::Newline => arity_exact(name, 0, args.len()),
    };
    if let Some(err) = arity_err {
        out.result = MayFail::failure(err);
        return out;
    }

    match prim {
        Prim::Add => out.result = fold_numeric(domain, BinaryOperator::Plus, domain.int(0), args),
        Prim::Mul => out.result = fold_numeric(domain, BinaryOperator::Times, domain.int(1), args),
        Prim::Sub => {
            out.result = if args.len() == 1 {
                domain.binary(BinaryOperator::Minus, &domain.int(0), &args[0])
            } else {
                fold_numeric(domain, BinaryOperator::Minus, args[0].clone(), &args[1..])
            }
        }
        Prim::Div => {
            out.result = if args.len() == 1 {
                domain.binary(BinaryOperator::Div, &domain.int(1), &args[0])
            } else {
                fold_numeric(domain, BinaryOperator::Div, args[0].clone(), &args[1..])
            }
        }
        Prim::Quotient => out.result = domain.binary(BinaryOperator::Quotient, &args[0], &args[1]),
        Prim::Modulo => out.result = domain.binary(BinaryOperator::Modulo, &args[0], &args[1]),
        Prim::Remainder => {
            out.result = domain.binary(BinaryOperator::Remainder, &args[0], &args[1])
        }
        Prim::NumEq => out.result = domain.binary(BinaryOperator::NumEq, &args[0], &args[1]),
        Prim::Lt => out.result = domain.binary(BinaryOperator::Lt, &args[0], &args[1]),
        Prim::Gt => out.result = domain.binary(BinaryOperator::Lt, &args[1], &args[0]),
        Prim::Le => {
            let mut r = domain.binary(BinaryOperator::Lt, &args[0], &args[1]);
            r.join(domain.binary(BinaryOperator::NumEq, &args[0], &args[1]));
            out.result = r;
        }
        Prim::Ge => {
            let mut r = domain.binary(BinaryOperator::Lt, &args[1], &args[0]);
            r.join(domain.binary(BinaryOperator::NumEq, &args[0], &args[1]));
            out.result = r;
        }
        Prim::IsZero => {
            out.result = domain.binary(BinaryOperator::NumEq, &args[0], &domain.int(0))
        }
        Prim::Unary(op) => out.result = domain.unary(op, &args[0]),
        Prim::EqP | Prim::EqualP => {
            out.result = domain.binary(BinaryOperator::Eq, &args[0], &args[1])
        }
        Prim::StringAppend => {
            out.result = domain.binary(BinaryOperator::StringAppend, &args[0], &args[1])
        }
        Prim::Cons => {
            let car = alloc.cell(fexp, CellRole::Car, t);
            let cdr = alloc.cell(fexp, CellRole::Cdr, t);
            out.store = out.store.extend(car.clone(), args[0].clone());
            out.store = out.store.extend(cdr.clone(), args[1].clone());
            out.effects.insert(Effect::new(EffectKind::WriteCar, car.clone()));
            out.effects.insert(Effect::new(EffectKind::WriteCdr, cdr.clone()));
            out.result = MayFail::success(domain.cons(car, cdr));
        }
        Prim::Car => read_pair_side(&mut out, domain, &args[0], true),
        Prim::Cdr => read_pair_side(&mut out, domain, &args[0], false),
        Prim::SetCar => write_pair_side(&mut out, domain, &args[0], &args[1], true),
        Prim::SetCdr => write_pair_side(&mut out, domain, &args[0], &args[1], false),
        Prim::MakeVector => {
            let length = domain.as_int(&args[0]).and_then(|n| u64::try_from(n).ok());
            let fill = args.get(1).cloned().unwrap_or_else(|| domain.int(0));
            let addr = alloc.cell(fexp, CellRole::Content, t);
            out.store = out.store.extend(addr.clone(), fill);
            out.effects.insert(Effect::new(EffectKind::WriteVec, addr.clone()));
            out.result = MayFail::success(domain.vector(VectorRef { addr, length }));
        }
        Prim::VectorLit => {
            let addr = alloc.cell(fexp, CellRole::Content, t);
            let mut content = D::Value::bottom();
            for a in args {
                content.join(a);
            }
            out.store = out.store.extend(addr.clone(), content);
            out.effects.insert(Effect::new(EffectKind::WriteVec, addr.clone()));
            out.result = MayFail::success(domain.vector(VectorRef {
                addr,
                length: Some(args.len() as u64),
            }));
        }
        Prim::VectorRead => {
            let vecs = domain.vectors(&args[0]);
            if vecs.is_empty() {
                out.result = MayFail::failure(SemanticError::TypeError {
                    expected: "vector",
                    got: args[0].to_string(),
                });
            }
            for v in vecs {
                out.effects
                    .insert(Effect::new(EffectKind::ReadVec, v.addr.clone()));
                match out.store.lookup(&v.addr) {
                    Some(content) => out.result.join(MayFail::success(content.clone())),
                    None => {
                        out.result.join(MayFail::failure(SemanticError::UnboundAddress(
                            v.addr.to_string(),
                        )))
                    }
                }
            }
        }
        Prim::VectorWrite => {
            let vecs = domain.vectors(&args[0]);
            if vecs.is_empty() {
                out.result = MayFail::failure(SemanticError::TypeError {
                    expected: "vector",
                    got: args[0].to_string(),
                });
            } else {
                for v in vecs {
                    out.effects
                        .insert(Effect::new(EffectKind::WriteVec, v.addr.clone()));
                    out.store = out.store.update(v.addr, args[2].clone());
                }
                out.result = MayFail::success(domain.nil());
            }
        }
        Prim::Fail => {
            let message = args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" ");
            out.result = MayFail::failure(SemanticError::UserError {
                position: fexp.position(),
                message,
            });
        }
        // exploration performs no I/O: display yields its argument,
        // newline yields nil
        Prim::Show => out.result = MayFail::success(args[0].clone()),
        Prim::Newline => out.result = MayFail::success(domain.nil()),
    }
    out
}

fn fold_numeric<A, D>(
    domain: &D,
    op: BinaryOperator,
    init: D::Value,
    args: &[D::Value],
) -> MayFail<D::Value>
where
    A: Address,
    D: ValueDomain<SchemeExp, A>,
{
    args.iter().fold(MayFail::success(init), |acc, arg| {
        acc.and_then(|v| domain.binary(op, &v, arg))
    })
}

fn read_pair_side<A, D>(
    out: &mut PrimOutcome<A, D::Value>,
    domain: &D,
    pair: &D::Value,
    car: bool,
) where
    A: Address,
    D: ValueDomain<SchemeExp, A>,
{
    let (addrs, kind) = if car {
        (domain.car(pair), EffectKind::ReadCar)
    } else {
        (domain.cdr(pair), EffectKind::ReadCdr)
    };
    if addrs.is_empty() {
        out.result = MayFail::failure(SemanticError::TypeError {
            expected: "pair",
            got: pair.to_string(),
        });
        return;
    }
    for addr in addrs {
        out.effects.insert(Effect::new(kind, addr.clone()));
        match out.store.lookup(&addr) {
            Some(v) => out.result.join(MayFail::success(v.clone())),
            None => out
                .result
                .join(MayFail::failure(SemanticError::UnboundAddress(addr.to_string()))),
        }
    }
}

fn write_pair_side<A, D>(
    out: &mut PrimOutcome<A, D::Value>,
    domain: &D,
    pair: &D::Value,
    value: &D::Value,
    car: bool,
) where
    A: Address,
    D: ValueDomain<SchemeExp, A>,
{
    let (addrs, kind) = if car {
        (domain.car(pair), EffectKind::WriteCar)
    } else {
        (domain.cdr(pair), EffectKind::WriteCdr)
    };
    if addrs.is_empty() {
        out.result = MayFail::failure(SemanticError::TypeError {
            expected: "pair",
            got: pair.to_string(),
        });
        return;
    }
    for addr in addrs {
        out.effects.insert(Effect::new(kind, addr.clone()));
        out.store = std::mem::replace(&mut out.store, Store::empty()).update(addr, value.clone());
    }
    out.result = MayFail::success(domain.nil());
}
