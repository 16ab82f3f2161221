use crate::error::SemanticError;

/// The recoverable-error effect threaded through a single semantics step.
///
/// A computation over abstract values can succeed, fail, or do both at once
/// (an operator applied to a value that may or may not have the right
/// shape). `MayFail` is the monoid `(successes, errors)`: combinators keep
/// both sides, and the driver lowers the result into error actions plus
/// success actions when the step finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MayFail<T> {
    successes: Vec<T>,
    errors: Vec<SemanticError>,
}

impl<T> MayFail<T> {
    pub fn success(value: T) -> Self {
        MayFail {
            successes: vec![value],
            errors: vec![],
        }
    }

    pub fn failure(error: SemanticError) -> Self {
        MayFail {
            successes: vec![],
            errors: vec![error],
        }
    }

    pub fn empty() -> Self {
        MayFail {
            successes: vec![],
            errors: vec![],
        }
    }

    pub fn both(value: T, error: SemanticError) -> Self {
        MayFail {
            successes: vec![value],
            errors: vec![error],
        }
    }

    pub fn successes(&self) -> &[T] {
        &self.successes
    }

    pub fn errors(&self) -> &[SemanticError] {
        &self.errors
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> MayFail<U> {
        MayFail {
            successes: self.successes.into_iter().map(f).collect(),
            errors: self.errors,
        }
    }

    pub fn and_then<U>(self, mut f: impl FnMut(T) -> MayFail<U>) -> MayFail<U> {
        let mut out = MayFail {
            successes: vec![],
            errors: self.errors,
        };
        for v in self.successes {
            let r = f(v);
            out.successes.extend(r.successes);
            out.errors.extend(r.errors);
        }
        out
    }

    /// Monoid append.
    pub fn join(&mut self, other: MayFail<T>) {
        self.successes.extend(other.successes);
        self.errors.extend(other.errors);
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<SemanticError>) {
        (self.successes, self.errors)
    }
}

impl<T> From<Result<T, SemanticError>> for MayFail<T> {
    fn from(r: Result<T, SemanticError>) -> Self {
        match r {
            Ok(v) => MayFail::success(v),
            Err(e) => MayFail::failure(e),
        }
    }
}

impl<T> FromIterator<MayFail<T>> for MayFail<T> {
    fn from_iter<I: IntoIterator<Item = MayFail<T>>>(iter: I) -> Self {
        let mut acc = MayFail::empty();
        for m in iter {
            acc.join(m);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exp::Identifier;

    fn err() -> SemanticError {
        SemanticError::UnboundVariable(Identifier::new("y"))
    }

    #[test]
    fn and_then_threads_both_sides() {
        let m = MayFail::both(1, err()).and_then(|n| {
            if n > 0 {
                MayFail::success(n * 2)
            } else {
                MayFail::failure(err())
            }
        });
        assert_eq!(m.successes(), &[2]);
        assert_eq!(m.errors().len(), 1);
    }

    #[test]
    fn collect_is_the_monoid_fold() {
        let m: MayFail<i64> = vec![MayFail::success(1), MayFail::failure(err()), MayFail::success(2)]
            .into_iter()
            .collect();
        assert_eq!(m.successes(), &[1, 2]);
        assert_eq!(m.errors().len(), 1);
    }
}
