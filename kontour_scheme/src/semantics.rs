use crate::exp::{ExpKind, Literal, SchemeExp};
use crate::primitives::{self, PrimOutcome};
use crate::sexp::{SExp, SExpKind};
use kontour::lattice::JoinSemiLattice;
use kontour::semantics::Frame;
use kontour::{
    Action, Address, Allocator, Behavior, CellRole, Effect, EffectKind, Env, Expression,
    Identifier, KontourError, LatticeValue, MayFail, Pid, Position, SemanticError, Semantics,
    Store, Tid, Timestamp, ValueDomain,
};
use std::marker::PhantomData;

/// The suspended-computation shapes of the Scheme semantics. Frames that
/// collect sub-results (argument lists, message payloads) carry the
/// values evaluated so far, so frame identity distinguishes call states.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum SchemeFrame<A: Address, V: LatticeValue> {
    If {
        cons: SchemeExp,
        alt: SchemeExp,
        env: Env<A>,
    },
    Let {
        var: Identifier,
        evaluated: Vec<(Identifier, V)>,
        rest: Vec<(Identifier, SchemeExp)>,
        body: SchemeExp,
        env: Env<A>,
    },
    Letrec {
        addr: A,
        rest: Vec<(A, SchemeExp)>,
        body: SchemeExp,
        env: Env<A>,
    },
    Set {
        var: Identifier,
        env: Env<A>,
    },
    Begin {
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
    And {
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
    Or {
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
    AppOp {
        fexp: SchemeExp,
        operands: Vec<SchemeExp>,
        env: Env<A>,
    },
    AppArgs {
        fexp: SchemeExp,
        operator: V,
        evaluated: Vec<V>,
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
    Join,
    Acquire,
    Release,
    Create {
        site: Position,
        evaluated: Vec<V>,
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
    Become {
        evaluated: Vec<V>,
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
    Send {
        tag: Identifier,
        evaluated: Vec<V>,
        rest: Vec<SchemeExp>,
        env: Env<A>,
    },
}

impl<A: Address, V: LatticeValue> Frame for SchemeFrame<A, V> {}

/// The Scheme semantics plug-in, generic over the value domain, the
/// address allocation policy, and the timestamp policy.
#[derive(Clone, Debug)]
pub struct SchemeSemantics<A, D, AL, T> {
    domain: D,
    alloc: AL,
    _marker: PhantomData<fn() -> (A, T)>,
}

type Act<A, D> = Action<SchemeExp, A, <D as ValueDomain<SchemeExp, A>>::Value, SchemeFrame<A, <D as ValueDomain<SchemeExp, A>>::Value>>;

impl<A, D, AL, T> SchemeSemantics<A, D, AL, T>
where
    A: Address,
    D: ValueDomain<SchemeExp, A>,
    AL: Allocator<SchemeExp, D::Value, T, Addr = A> + Send + Sync,
    T: Timestamp,
{
    pub fn new(domain: D, alloc: AL) -> Self {
        SchemeSemantics {
            domain,
            alloc,
            _marker: PhantomData,
        }
    }

    fn lit_value(&self, lit: &Literal) -> D::Value {
        match lit {
            Literal::Int(n) => self.domain.int(*n),
            Literal::Float(x) => self.domain.float(*x),
            Literal::Bool(b) => self.domain.boolean(*b),
            Literal::Char(c) => self.domain.character(*c),
            Literal::Str(s) => self.domain.string(s),
        }
    }

    /// Turn a quoted datum into a value, allocating pairs at each
    /// sub-datum's position.
    fn datum_value(
        &self,
        datum: &SExp,
        store: Store<A, D::Value>,
        t: &T,
    ) -> (D::Value, Store<A, D::Value>) {
        match &datum.kind {
            SExpKind::Bool(b) => (self.domain.boolean(*b), store),
            SExpKind::Int(n) => (self.domain.int(*n), store),
            SExpKind::Float(x) => (self.domain.float(*x), store),
            SExpKind::Char(c) => (self.domain.character(*c), store),
            SExpKind::Str(s) => (self.domain.string(s), store),
            SExpKind::Symbol(name) => (self.domain.symbol(*name), store),
            SExpKind::List(items) => {
                let mut value = self.domain.nil();
                let mut store = store;
                for item in items.iter().rev() {
                    let (item_value, s) = self.datum_value(item, store, t);
                    let car = self.alloc.cell_at(item.pos, CellRole::Car, t);
                    let cdr = self.alloc.cell_at(item.pos, CellRole::Cdr, t);
                    store = s.extend(car.clone(), item_value).extend(cdr.clone(), value);
                    value = self.domain.cons(car, cdr);
                }
                (value, store)
            }
        }
    }

    /// Lower a `MayFail` into value and error actions.
    fn lower(
        &self,
        outcome: MayFail<D::Value>,
        store: &Store<A, D::Value>,
        effects: kontour::Effects<A>,
    ) -> Vec<Act<A, D>> {
        let (oks, errs) = outcome.into_parts();
        let mut actions: Vec<Act<A, D>> = Vec::with_capacity(oks.len() + errs.len());
        for v in oks {
            actions.push(Action::value(v, store.clone()).with_effects(effects.clone()));
        }
        for e in errs {
            actions.push(Action::error(e));
        }
        actions
    }

    /// Apply an operator value to evaluated arguments.
    fn apply(
        &self,
        fexp: &SchemeExp,
        operator: &D::Value,
        args: &[D::Value],
        store: &Store<A, D::Value>,
        t: &T,
    ) -> Vec<Act<A, D>> {
        let mut actions = Vec::new();
        for closure in self.domain.closures(operator) {
            let ExpKind::Lambda { params, body } = closure.lambda.kind.as_ref() else {
                actions.push(Action::error(SemanticError::TypeError {
                    expected: "lambda",
                    got: closure.lambda.to_string(),
                }));
                continue;
            };
            if params.len() != args.len() {
                actions.push(Action::error(SemanticError::ArityError {
                    operator: Identifier::new(&format!("λ@{}", closure.lambda.position())),
                    expected: params.len(),
                    got: args.len(),
                }));
                continue;
            }
            let mut env = closure.env.clone();
            let mut store = store.clone();
            for (param, arg) in params.iter().zip(args) {
                let addr = self.alloc.variable(*param, arg, t);
                env = env.extend(*param, addr.clone());
                store = store.extend(addr, arg.clone());
            }
            actions.push(Action::step_in(fexp.clone(), body.clone(), env, store));
        }
        for name in self.domain.primitives(operator) {
            match primitives::lookup(name) {
                Some(prim) => {
                    let PrimOutcome {
                        result,
                        store,
                        effects,
                    } = primitives::apply_prim(
                        prim,
                        name,
                        args,
                        fexp,
                        &self.domain,
                        &self.alloc,
                        store.clone(),
                        t,
                    );
                    actions.extend(self.lower(result, &store, effects));
                }
                None => actions.push(Action::error(SemanticError::NotSupported(format!(
                    "unknown primitive {name}"
                )))),
            }
        }
        if actions.is_empty() {
            actions.push(Action::error(SemanticError::OperatorNotApplicable {
                operator: Identifier::new(&fexp.to_string()),
                operands: args
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            }));
        }
        actions
    }

    /// Bind a behavior template's fields to `args`, yielding the behavior
    /// instance value.
    fn instantiate(
        &self,
        template_value: &D::Value,
        args: &[D::Value],
        store: &Store<A, D::Value>,
        t: &T,
    ) -> Vec<(D::Value, Store<A, D::Value>)> {
        let mut out = Vec::new();
        for template in self.domain.behaviors(template_value) {
            let ExpKind::ActorDef { fields, .. } = template.exp.kind.as_ref() else {
                continue;
            };
            if fields.len() != args.len() {
                continue;
            }
            let mut env = template.env.clone();
            let mut store = store.clone();
            for (field, arg) in fields.iter().zip(args) {
                let addr = self.alloc.variable(*field, arg, t);
                env = env.extend(*field, addr.clone());
                store = store.extend(addr, arg.clone());
            }
            let instance = Behavior {
                name: template.name,
                exp: template.exp.clone(),
                env,
            };
            out.push((self.domain.behavior(instance), store));
        }
        out
    }

    fn instantiate_actions(
        &self,
        template_value: &D::Value,
        args: &[D::Value],
        store: &Store<A, D::Value>,
        t: &T,
        make: impl Fn(D::Value, Store<A, D::Value>) -> Act<A, D>,
    ) -> Vec<Act<A, D>> {
        let instances = self.instantiate(template_value, args, store, t);
        if instances.is_empty() {
            return vec![Action::error(SemanticError::TypeError {
                expected: "behavior",
                got: template_value.to_string(),
            })];
        }
        instances
            .into_iter()
            .map(|(value, store)| make(value, store))
            .collect()
    }

    /// Evaluate the next item of an accumulating frame, or finish.
    fn continue_gather(
        &self,
        frame: SchemeFrame<A, D::Value>,
        next: Option<SchemeExp>,
        env: &Env<A>,
        store: &Store<A, D::Value>,
        finish: impl FnOnce(&Self) -> Vec<Act<A, D>>,
    ) -> Vec<Act<A, D>> {
        match next {
            Some(exp) => vec![Action::push(frame, exp, env.clone(), store.clone())],
            None => finish(self),
        }
    }
}

impl<A, D, AL, T> Semantics for SchemeSemantics<A, D, AL, T>
where
    A: Address,
    D: ValueDomain<SchemeExp, A>,
    AL: Allocator<SchemeExp, D::Value, T, Addr = A> + Send + Sync,
    T: Timestamp,
{
    type Exp = SchemeExp;
    type Addr = A;
    type Time = T;
    type Frame = SchemeFrame<A, D::Value>;
    type Domain = D;

    fn domain(&self) -> &D {
        &self.domain
    }

    fn parse(&self, source: &str) -> Result<SchemeExp, KontourError> {
        let data = crate::sexp::parse_program(source)?;
        crate::exp::compile_program(&data)
    }

    fn initial_bindings(&self) -> Vec<(Identifier, A, D::Value)> {
        primitives::PRIMITIVES
            .iter()
            .map(|(name, _)| {
                let id = Identifier::new(name);
                (
                    id,
                    self.alloc.primitive(id),
                    self.domain.primitive(id),
                )
            })
            .collect()
    }

    fn step_eval(
        &self,
        e: &SchemeExp,
        env: &Env<A>,
        store: &Store<A, D::Value>,
        t: &T,
    ) -> Vec<Act<A, D>> {
        match e.kind.as_ref() {
            ExpKind::Lit(lit) => {
                vec![Action::value(self.lit_value(lit), store.clone())]
            }
            ExpKind::Var(name) => match env.lookup(name) {
                Some(addr) => match store.lookup(addr) {
                    Some(v) => vec![Action::value(v.clone(), store.clone()).with_effects(
                        [Effect::new(EffectKind::ReadVar, addr.clone())].into(),
                    )],
                    None => vec![Action::error(SemanticError::UnboundAddress(
                        addr.to_string(),
                    ))],
                },
                None => vec![Action::error(SemanticError::UnboundVariable(*name))],
            },
            ExpKind::Quote(datum) => {
                let (value, store) = self.datum_value(datum, store.clone(), t);
                vec![Action::value(value, store)]
            }
            ExpKind::Lambda { .. } => {
                vec![Action::value(self.domain.closure(e, env), store.clone())]
            }
            ExpKind::If { cond, cons, alt } => vec![Action::push(
                SchemeFrame::If {
                    cons: cons.clone(),
                    alt: alt.clone(),
                    env: env.clone(),
                },
                cond.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::Let { bindings, body } => match bindings.split_first() {
                None => vec![Action::eval(body.clone(), env.clone(), store.clone())],
                Some(((var, exp), rest)) => vec![Action::push(
                    SchemeFrame::Let {
                        var: *var,
                        evaluated: vec![],
                        rest: rest.to_vec(),
                        body: body.clone(),
                        env: env.clone(),
                    },
                    exp.clone(),
                    env.clone(),
                    store.clone(),
                )],
            },
            ExpKind::Letrec { bindings, body } => {
                // all names are in scope in every binding expression, so
                // pre-allocate every address before evaluating anything
                let mut env2 = env.clone();
                let mut store2 = store.clone();
                let bottom = D::Value::bottom();
                let mut addrs = Vec::with_capacity(bindings.len());
                for (name, _) in bindings {
                    let addr = self.alloc.variable(*name, &bottom, t);
                    env2 = env2.extend(*name, addr.clone());
                    store2 = store2.extend(addr.clone(), bottom.clone());
                    addrs.push(addr);
                }
                match bindings.split_first() {
                    None => vec![Action::eval(body.clone(), env2, store2)],
                    Some(((_, exp), rest)) => {
                        let rest = addrs[1..]
                            .iter()
                            .cloned()
                            .zip(rest.iter().map(|(_, e)| e.clone()))
                            .collect();
                        vec![Action::push(
                            SchemeFrame::Letrec {
                                addr: addrs[0].clone(),
                                rest,
                                body: body.clone(),
                                env: env2.clone(),
                            },
                            exp.clone(),
                            env2,
                            store2,
                        )]
                    }
                }
            }
            ExpKind::Set { var, value } => vec![Action::push(
                SchemeFrame::Set {
                    var: *var,
                    env: env.clone(),
                },
                value.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::Begin { exps } => match exps.split_first() {
                None => vec![Action::value(self.domain.boolean(false), store.clone())],
                Some((first, [])) => {
                    vec![Action::eval(first.clone(), env.clone(), store.clone())]
                }
                Some((first, rest)) => vec![Action::push(
                    SchemeFrame::Begin {
                        rest: rest.to_vec(),
                        env: env.clone(),
                    },
                    first.clone(),
                    env.clone(),
                    store.clone(),
                )],
            },
            ExpKind::And { exps } => match exps.split_first() {
                None => vec![Action::value(self.domain.boolean(true), store.clone())],
                Some((first, rest)) => vec![Action::push(
                    SchemeFrame::And {
                        rest: rest.to_vec(),
                        env: env.clone(),
                    },
                    first.clone(),
                    env.clone(),
                    store.clone(),
                )],
            },
            ExpKind::Or { exps } => match exps.split_first() {
                None => vec![Action::value(self.domain.boolean(false), store.clone())],
                Some((first, rest)) => vec![Action::push(
                    SchemeFrame::Or {
                        rest: rest.to_vec(),
                        env: env.clone(),
                    },
                    first.clone(),
                    env.clone(),
                    store.clone(),
                )],
            },
            ExpKind::App { operator, operands } => vec![Action::push(
                SchemeFrame::AppOp {
                    fexp: e.clone(),
                    operands: operands.clone(),
                    env: env.clone(),
                },
                operator.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::Spawn { body } => {
                let tid = Tid::from_site(body.pos, t);
                let cont = Action::value(self.domain.tid(tid), store.clone());
                vec![Action::Spawn {
                    tid,
                    exp: body.clone(),
                    env: env.clone(),
                    store: store.clone(),
                    cont: Box::new(cont),
                    effects: kontour::Effects::new(),
                }]
            }
            ExpKind::JoinThread { thread } => vec![Action::push(
                SchemeFrame::Join,
                thread.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::NewLock => {
                let addr = self.alloc.cell(e, CellRole::Lock, t);
                let store = store.clone().extend(addr.clone(), self.domain.boolean(false));
                vec![Action::value(self.domain.lock(addr), store)]
            }
            ExpKind::Acquire { lock } => vec![Action::push(
                SchemeFrame::Acquire,
                lock.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::Release { lock } => vec![Action::push(
                SchemeFrame::Release,
                lock.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::ActorDef { name, .. } => {
                let behavior = Behavior {
                    name: *name,
                    exp: e.clone(),
                    env: env.clone(),
                };
                vec![Action::value(self.domain.behavior(behavior), store.clone())]
            }
            ExpKind::Create { behavior, args } => vec![Action::push(
                SchemeFrame::Create {
                    site: e.pos,
                    evaluated: vec![],
                    rest: args.clone(),
                    env: env.clone(),
                },
                behavior.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::SendMsg { target, tag, args } => vec![Action::push(
                SchemeFrame::Send {
                    tag: *tag,
                    evaluated: vec![],
                    rest: args.clone(),
                    env: env.clone(),
                },
                target.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::Become { behavior, args } => vec![Action::push(
                SchemeFrame::Become {
                    evaluated: vec![],
                    rest: args.clone(),
                    env: env.clone(),
                },
                behavior.clone(),
                env.clone(),
                store.clone(),
            )],
            ExpKind::Terminate => vec![Action::Terminate],
        }
    }

    fn step_kont(
        &self,
        value: &D::Value,
        frame: &SchemeFrame<A, D::Value>,
        store: &Store<A, D::Value>,
        t: &T,
    ) -> Vec<Act<A, D>> {
        match frame {
            SchemeFrame::If { cons, alt, env } => {
                let mut actions = Vec::new();
                if self.domain.is_true(value) {
                    actions.push(Action::eval(cons.clone(), env.clone(), store.clone()));
                }
                if self.domain.is_false(value) {
                    actions.push(Action::eval(alt.clone(), env.clone(), store.clone()));
                }
                actions
            }
            SchemeFrame::Let {
                var,
                evaluated,
                rest,
                body,
                env,
            } => {
                let mut evaluated = evaluated.clone();
                evaluated.push((*var, value.clone()));
                match rest.split_first() {
                    Some(((next_var, next_exp), rest)) => vec![Action::push(
                        SchemeFrame::Let {
                            var: *next_var,
                            evaluated,
                            rest: rest.to_vec(),
                            body: body.clone(),
                            env: env.clone(),
                        },
                        next_exp.clone(),
                        env.clone(),
                        store.clone(),
                    )],
                    None => {
                        // all binding expressions saw the outer
                        // environment; the body sees them all at once
                        let mut env2 = env.clone();
                        let mut store2 = store.clone();
                        for (name, v) in evaluated {
                            let addr = self.alloc.variable(name, &v, t);
                            env2 = env2.extend(name, addr.clone());
                            store2 = store2.extend(addr, v);
                        }
                        vec![Action::eval(body.clone(), env2, store2)]
                    }
                }
            }
            SchemeFrame::Letrec {
                addr,
                rest,
                body,
                env,
            } => {
                let store2 = store.clone().update(addr.clone(), value.clone());
                let effects: kontour::Effects<A> =
                    [Effect::new(EffectKind::WriteVar, addr.clone())].into();
                match rest.split_first() {
                    Some(((next_addr, next_exp), rest)) => vec![Action::push(
                        SchemeFrame::Letrec {
                            addr: next_addr.clone(),
                            rest: rest.to_vec(),
                            body: body.clone(),
                            env: env.clone(),
                        },
                        next_exp.clone(),
                        env.clone(),
                        store2,
                    )
                    .with_effects(effects)],
                    None => vec![
                        Action::eval(body.clone(), env.clone(), store2).with_effects(effects),
                    ],
                }
            }
            SchemeFrame::Set { var, env } => match env.lookup(var) {
                Some(addr) => {
                    let store2 = store.clone().update(addr.clone(), value.clone());
                    vec![Action::value(self.domain.nil(), store2).with_effects(
                        [Effect::new(EffectKind::WriteVar, addr.clone())].into(),
                    )]
                }
                None => vec![Action::error(SemanticError::UnboundVariable(*var))],
            },
            SchemeFrame::Begin { rest, env } => match rest.split_first() {
                Some((first, [])) => {
                    vec![Action::eval(first.clone(), env.clone(), store.clone())]
                }
                Some((first, rest)) => vec![Action::push(
                    SchemeFrame::Begin {
                        rest: rest.to_vec(),
                        env: env.clone(),
                    },
                    first.clone(),
                    env.clone(),
                    store.clone(),
                )],
                None => vec![Action::value(value.clone(), store.clone())],
            },
            SchemeFrame::And { rest, env } => {
                let mut actions = Vec::new();
                if self.domain.is_false(value) {
                    actions.push(Action::value(value.clone(), store.clone()));
                }
                if self.domain.is_true(value) {
                    match rest.split_first() {
                        None => actions.push(Action::value(value.clone(), store.clone())),
                        Some((first, rest)) => actions.push(Action::push(
                            SchemeFrame::And {
                                rest: rest.to_vec(),
                                env: env.clone(),
                            },
                            first.clone(),
                            env.clone(),
                            store.clone(),
                        )),
                    }
                }
                actions
            }
            SchemeFrame::Or { rest, env } => {
                let mut actions = Vec::new();
                if self.domain.is_true(value) {
                    actions.push(Action::value(value.clone(), store.clone()));
                }
                if self.domain.is_false(value) {
                    match rest.split_first() {
                        None => actions.push(Action::value(value.clone(), store.clone())),
                        Some((first, rest)) => actions.push(Action::push(
                            SchemeFrame::Or {
                                rest: rest.to_vec(),
                                env: env.clone(),
                            },
                            first.clone(),
                            env.clone(),
                            store.clone(),
                        )),
                    }
                }
                actions
            }
            SchemeFrame::AppOp {
                fexp,
                operands,
                env,
            } => match operands.split_first() {
                None => self.apply(fexp, value, &[], store, t),
                Some((first, rest)) => vec![Action::push(
                    SchemeFrame::AppArgs {
                        fexp: fexp.clone(),
                        operator: value.clone(),
                        evaluated: vec![],
                        rest: rest.to_vec(),
                        env: env.clone(),
                    },
                    first.clone(),
                    env.clone(),
                    store.clone(),
                )],
            },
            SchemeFrame::AppArgs {
                fexp,
                operator,
                evaluated,
                rest,
                env,
            } => {
                let mut evaluated = evaluated.clone();
                evaluated.push(value.clone());
                match rest.split_first() {
                    Some((first, rest)) => vec![Action::push(
                        SchemeFrame::AppArgs {
                            fexp: fexp.clone(),
                            operator: operator.clone(),
                            evaluated,
                            rest: rest.to_vec(),
                            env: env.clone(),
                        },
                        first.clone(),
                        env.clone(),
                        store.clone(),
                    )],
                    None => self.apply(fexp, operator, &evaluated, store, t),
                }
            }
            SchemeFrame::Join => vec![Action::Join {
                threads: value.clone(),
                store: store.clone(),
                effects: kontour::Effects::new(),
            }],
            SchemeFrame::Acquire => {
                let locks = self.domain.locks(value);
                if locks.is_empty() {
                    return vec![Action::error(SemanticError::TypeError {
                        expected: "lock",
                        got: value.to_string(),
                    })];
                }
                let mut actions = Vec::new();
                for addr in locks {
                    let held = store.lookup(&addr).cloned().unwrap_or_else(|| {
                        self.domain.boolean(false)
                    });
                    // enabled only while the lock may be free; a held
                    // lock blocks this branch until a release runs
                    if self.domain.is_false(&held) {
                        let store2 =
                            store.clone().update(addr.clone(), self.domain.boolean(true));
                        actions.push(
                            Action::value(self.domain.boolean(true), store2).with_effects(
                                [Effect::new(EffectKind::Acquire, addr.clone())].into(),
                            ),
                        );
                    }
                }
                actions
            }
            SchemeFrame::Release => {
                let locks = self.domain.locks(value);
                if locks.is_empty() {
                    return vec![Action::error(SemanticError::TypeError {
                        expected: "lock",
                        got: value.to_string(),
                    })];
                }
                let mut actions = Vec::new();
                for addr in locks {
                    let store2 =
                        store.clone().update(addr.clone(), self.domain.boolean(false));
                    actions.push(
                        Action::value(self.domain.boolean(true), store2).with_effects(
                            [Effect::new(EffectKind::Release, addr.clone())].into(),
                        ),
                    );
                }
                actions
            }
            SchemeFrame::Create {
                site,
                evaluated,
                rest,
                env,
            } => {
                let mut evaluated = evaluated.clone();
                evaluated.push(value.clone());
                let frame = SchemeFrame::Create {
                    site: *site,
                    evaluated: evaluated.clone(),
                    rest: rest[1.min(rest.len())..].to_vec(),
                    env: env.clone(),
                };
                let site = *site;
                self.continue_gather(frame, rest.first().cloned(), env, store, move |this| {
                    let (template, args) = evaluated.split_first().expect("behavior first");
                    this.instantiate_actions(template, args, store, t, |behavior, store| {
                        Action::Create {
                            behavior,
                            site,
                            store,
                            effects: kontour::Effects::new(),
                        }
                    })
                })
            }
            SchemeFrame::Become {
                evaluated,
                rest,
                env,
            } => {
                let mut evaluated = evaluated.clone();
                evaluated.push(value.clone());
                let frame = SchemeFrame::Become {
                    evaluated: evaluated.clone(),
                    rest: rest[1.min(rest.len())..].to_vec(),
                    env: env.clone(),
                };
                self.continue_gather(frame, rest.first().cloned(), env, store, move |this| {
                    let (template, args) = evaluated.split_first().expect("behavior first");
                    this.instantiate_actions(template, args, store, t, |behavior, store| {
                        Action::Become {
                            behavior,
                            store,
                            effects: kontour::Effects::new(),
                        }
                    })
                })
            }
            SchemeFrame::Send {
                tag,
                evaluated,
                rest,
                env,
            } => {
                let mut evaluated = evaluated.clone();
                evaluated.push(value.clone());
                let frame = SchemeFrame::Send {
                    tag: *tag,
                    evaluated: evaluated.clone(),
                    rest: rest[1.min(rest.len())..].to_vec(),
                    env: env.clone(),
                };
                let tag = *tag;
                self.continue_gather(frame, rest.first().cloned(), env, store, move |this| {
                    let (target, args) = evaluated.split_first().expect("target first");
                    let cont = Action::value(this.domain.nil(), store.clone());
                    vec![Action::Send {
                        target: target.clone(),
                        tag,
                        args: args.to_vec(),
                        cont: Box::new(cont),
                        effects: kontour::Effects::new(),
                    }]
                })
            }
        }
    }

    fn step_receive(
        &self,
        self_pid: Pid,
        behavior: &Behavior<SchemeExp, A>,
        tag: Identifier,
        args: &[D::Value],
        store: &Store<A, D::Value>,
        t: &T,
    ) -> Vec<Act<A, D>> {
        let ExpKind::ActorDef { name, handlers, .. } = behavior.exp.kind.as_ref() else {
            return vec![Action::error(SemanticError::TypeError {
                expected: "actor definition",
                got: behavior.exp.to_string(),
            })];
        };
        let Some(handler) = handlers.iter().find(|h| h.tag == tag) else {
            return vec![Action::error(SemanticError::MessageNotSupported {
                behavior: *name,
                tag,
            })];
        };
        if handler.params.len() != args.len() {
            return vec![Action::error(SemanticError::ArityError {
                operator: tag,
                expected: handler.params.len(),
                got: args.len(),
            })];
        }
        let mut env = behavior.env.clone();
        let mut store = store.clone();
        let self_value = self.domain.pid(self_pid);
        let self_name = Identifier::new("self");
        let self_addr = self.alloc.variable(self_name, &self_value, t);
        env = env.extend(self_name, self_addr.clone());
        store = store.extend(self_addr, self_value);
        for (param, arg) in handler.params.iter().zip(args) {
            let addr = self.alloc.variable(*param, arg, t);
            env = env.extend(*param, addr.clone());
            store = store.extend(addr, arg.clone());
        }
        vec![Action::eval(handler.body.clone(), env, store)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontour::value::TypeSetDomain;
    use kontour::{ClassicalAllocator, ZeroCfa};

    type Sem = SchemeSemantics<
        kontour::Addr<ZeroCfa>,
        TypeSetDomain,
        ClassicalAllocator,
        ZeroCfa,
    >;

    fn sem() -> Sem {
        SchemeSemantics::new(TypeSetDomain::type_set(), ClassicalAllocator)
    }

    fn initial(sem: &Sem) -> (Env<kontour::Addr<ZeroCfa>>, Store<kontour::Addr<ZeroCfa>, <TypeSetDomain as ValueDomain<SchemeExp, kontour::Addr<ZeroCfa>>>::Value>) {
        let mut env = Env::empty();
        let mut store = Store::empty();
        for (name, addr, value) in sem.initial_bindings() {
            env = env.extend(name, addr.clone());
            store = store.extend(addr, value);
        }
        (env, store)
    }

    #[test]
    fn literals_reduce_to_values() {
        let sem = sem();
        let (env, store) = initial(&sem);
        let e = sem.parse("42").unwrap();
        let actions = sem.step_eval(&e, &env, &store, &ZeroCfa);
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], Action::Value { .. }));
    }

    #[test]
    fn unbound_variables_error() {
        let sem = sem();
        let (env, store) = initial(&sem);
        let e = sem.parse("nope").unwrap();
        let actions = sem.step_eval(&e, &env, &store, &ZeroCfa);
        assert!(matches!(
            &actions[0],
            Action::Error {
                error: SemanticError::UnboundVariable(_)
            }
        ));
    }

    #[test]
    fn variable_reads_carry_read_effects() {
        let sem = sem();
        let (env, store) = initial(&sem);
        let e = sem.parse("car").unwrap();
        let actions = sem.step_eval(&e, &env, &store, &ZeroCfa);
        let Action::Value { effects, .. } = &actions[0] else {
            panic!("expected a value action");
        };
        assert!(effects.iter().any(|eff| eff.kind == EffectKind::ReadVar));
    }

    #[test]
    fn if_on_a_type_boolean_takes_both_branches() {
        let sem = sem();
        let (env, store) = initial(&sem);
        let frame = SchemeFrame::If {
            cons: sem.parse("1").unwrap(),
            alt: sem.parse("2").unwrap(),
            env: env.clone(),
        };
        let both = sem.domain().boolean(true);
        let actions = sem.step_kont(&both, &frame, &store, &ZeroCfa);
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn spawn_produces_a_spawn_action_with_continuation() {
        let sem = sem();
        let (env, store) = initial(&sem);
        let e = sem.parse("(spawn 1)").unwrap();
        let actions = sem.step_eval(&e, &env, &store, &ZeroCfa);
        let Action::Spawn { cont, .. } = &actions[0] else {
            panic!("expected spawn");
        };
        assert!(matches!(cont.as_ref(), Action::Value { .. }));
    }

    #[test]
    fn receive_dispatches_by_tag_and_checks_arity() {
        let sem = sem();
        let (env, store) = initial(&sem);
        let actor = sem.parse("(actor \"cell\" () (put (x) x))").unwrap();
        let behavior = Behavior {
            name: Identifier::new("cell"),
            exp: actor,
            env,
        };
        let v = sem.domain().int(1);
        let ok = sem.step_receive(
            Pid::main(),
            &behavior,
            Identifier::new("put"),
            &[v.clone()],
            &store,
            &ZeroCfa,
        );
        assert!(matches!(&ok[0], Action::Eval { .. }));
        let wrong_arity = sem.step_receive(
            Pid::main(),
            &behavior,
            Identifier::new("put"),
            &[],
            &store,
            &ZeroCfa,
        );
        assert!(matches!(
            &wrong_arity[0],
            Action::Error {
                error: SemanticError::ArityError { .. }
            }
        ));
        let unknown = sem.step_receive(
            Pid::main(),
            &behavior,
            Identifier::new("frobnicate"),
            &[],
            &store,
            &ZeroCfa,
        );
        assert!(matches!(
            &unknown[0],
            Action::Error {
                error: SemanticError::MessageNotSupported { .. }
            }
        ));
    }
}
