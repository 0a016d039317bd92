use super::exception::{ExceptionKind, Unwind};
use super::frame::Scope;
use super::value::Value;

/// Host side of guest console I/O.
pub trait Console: Send {
    fn write(&mut self, text: &str);
    fn clear(&mut self);
    /// Blocks until a line is available. Cancellation and terminal-level
    /// outcomes come back as `Unwind`.
    fn read_line(&mut self) -> Result<String, Unwind>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Input,
    Str,
    Int,
    Len,
    Clear,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Print,
        Builtin::Input,
        Builtin::Str,
        Builtin::Int,
        Builtin::Len,
        Builtin::Clear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Input => "input",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Len => "len",
            Builtin::Clear => "clear",
        }
    }
}

/// Truncate toward zero; floats outside the i64 range raise `OverflowError`.
fn float_to_int(f: f64) -> Result<Value, Unwind> {
    let t = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        return Ok(Value::Int(t as i64));
    }
    Err(Unwind::raise(
        ExceptionKind::OverflowError,
        format!("cannot convert float {} to integer", Value::Float(f)),
    ))
}

pub fn scope() -> Scope {
    Builtin::ALL
        .iter()
        .map(|b| (b.name().to_string(), Value::Builtin(*b)))
        .collect()
}

fn type_error(message: String) -> Unwind {
    Unwind::raise(ExceptionKind::TypeError, message)
}

fn at_most(builtin: Builtin, max: usize, args: &[Value]) -> Result<(), Unwind> {
    if args.len() > max {
        let plural = if max == 1 { "" } else { "s" };
        return Err(type_error(format!(
            "{} expected at most {} argument{}, got {}",
            builtin.name(),
            max,
            plural,
            args.len()
        )));
    }
    Ok(())
}

pub fn call(builtin: Builtin, args: Vec<Value>, console: &mut dyn Console) -> Result<Value, Unwind> {
    match builtin {
        Builtin::Print => {
            let mut line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            line.push('\n');
            console.write(&line);
            Ok(Value::None)
        }
        Builtin::Input => {
            at_most(builtin, 1, &args)?;
            if let Some(prompt) = args.first() {
                console.write(&prompt.to_string());
            }
            let line = console.read_line()?;
            Ok(Value::str(line))
        }
        Builtin::Str => {
            at_most(builtin, 1, &args)?;
            Ok(Value::str(
                args.first().map(|v| v.to_string()).unwrap_or_default(),
            ))
        }
        Builtin::Int => {
            at_most(builtin, 1, &args)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(i)) => Ok(Value::Int(*i)),
                Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
                Some(Value::Float(f)) => float_to_int(*f),
                Some(Value::Str(s)) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
                    Unwind::raise(
                        ExceptionKind::ValueError,
                        format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).repr()),
                    )
                }),
                Some(other) => Err(type_error(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Len => {
            if args.len() != 1 {
                return Err(type_error(format!(
                    "len() takes exactly one argument ({} given)",
                    args.len()
                )));
            }
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        Builtin::Clear => {
            at_most(builtin, 0, &args)?;
            console.clear();
            Ok(Value::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recorder {
        out: String,
        cleared: usize,
        input: VecDeque<String>,
    }

    impl Console for Recorder {
        fn write(&mut self, text: &str) {
            self.out.push_str(text);
        }

        fn clear(&mut self) {
            self.cleared += 1;
        }

        fn read_line(&mut self) -> Result<String, Unwind> {
            self.input
                .pop_front()
                .ok_or_else(|| Unwind::raise(ExceptionKind::EOFError, "EOF when reading a line"))
        }
    }

    #[test]
    fn test_print_joins_with_spaces() {
        let mut console = Recorder::default();
        call(Builtin::Print, vec![Value::Int(1), Value::str("a"), Value::None], &mut console).unwrap();
        assert_eq!(console.out, "1 a None\n");
    }

    #[test]
    fn test_input_writes_prompt_and_reads() {
        let mut console = Recorder::default();
        console.input.push_back("bob".into());
        let v = call(Builtin::Input, vec![Value::str("name? ")], &mut console).unwrap();
        assert_eq!(v, Value::str("bob"));
        assert_eq!(console.out, "name? ");
    }

    #[test]
    fn test_int_parsing() {
        let mut console = Recorder::default();
        assert_eq!(call(Builtin::Int, vec![Value::str(" 42 ")], &mut console).unwrap(), Value::Int(42));
        assert_eq!(call(Builtin::Int, vec![Value::Float(-2.7)], &mut console).unwrap(), Value::Int(-2));
        let err = call(Builtin::Int, vec![Value::str("abc")], &mut console).unwrap_err();
        match err {
            Unwind::Exception(exc) => {
                assert_eq!(exc.kind, ExceptionKind::ValueError);
                assert_eq!(exc.message, "invalid literal for int() with base 10: 'abc'");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_int_of_out_of_range_float_overflows() {
        let mut console = Recorder::default();
        for f in [1e20, -1e20, 9.223372036854775807e18, f64::INFINITY, f64::NAN] {
            match call(Builtin::Int, vec![Value::Float(f)], &mut console).unwrap_err() {
                Unwind::Exception(exc) => assert_eq!(exc.kind, ExceptionKind::OverflowError),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(
            call(Builtin::Int, vec![Value::Float(-9.223372036854775808e18)], &mut console).unwrap(),
            Value::Int(i64::MIN)
        );
        assert_eq!(
            call(Builtin::Int, vec![Value::Float(4.0e18)], &mut console).unwrap(),
            Value::Int(4_000_000_000_000_000_000)
        );
    }

    #[test]
    fn test_len_and_clear() {
        let mut console = Recorder::default();
        assert_eq!(call(Builtin::Len, vec![Value::str("héllo")], &mut console).unwrap(), Value::Int(5));
        assert!(call(Builtin::Len, vec![Value::Int(1)], &mut console).is_err());
        call(Builtin::Clear, vec![], &mut console).unwrap();
        assert_eq!(console.cleared, 1);
    }

    #[test]
    fn test_scope_contains_every_builtin() {
        let scope = scope();
        for b in Builtin::ALL {
            assert_eq!(scope.get(b.name()), Some(&Value::Builtin(b)));
        }
    }
}
