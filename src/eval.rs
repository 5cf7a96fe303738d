use std::collections::HashMap;
use std::mem;

use crate::error::CalcError;
use crate::lex::{Lexer, Token};

/// A user-defined function: parameter names in declaration order plus the
/// raw body text. The body is not validated at definition time; it is
/// re-tokenized fresh on every call, so its errors surface then.
#[derive(Debug, Clone)]
pub struct Function {
    params: Vec<String>,
    body: String,
}

/// The variable tables: one global table for the whole run plus a stack of
/// local tables, one per active function call. Name lookups resolve against
/// the innermost local table, or the globals outside of any call.
#[derive(Debug)]
pub struct Environment {
    globals: HashMap<String, f64>,
    locals: Vec<HashMap<String, f64>>,
}

impl Environment {
    pub fn new() -> Self {
        let mut globals = HashMap::new();
        globals.insert("pi".to_string(), std::f64::consts::PI);
        globals.insert("e".to_string(), std::f64::consts::E);
        Environment {
            globals,
            locals: Vec::new(),
        }
    }

    pub fn active(&self) -> &HashMap<String, f64> {
        self.locals.last().unwrap_or(&self.globals)
    }

    fn active_mut(&mut self) -> &mut HashMap<String, f64> {
        self.locals.last_mut().unwrap_or(&mut self.globals)
    }

    /// Reads a variable, materializing it with 0.0 if it does not exist.
    /// Merely mentioning a name brings it into being.
    pub fn fetch(&mut self, name: &str) -> f64 {
        *self.active_mut().entry(name.to_string()).or_insert(0.0)
    }

    pub fn assign(&mut self, name: String, value: f64) {
        self.active_mut().insert(name, value);
    }

    /// A plain lookup that does not materialize missing names.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.active().get(name).copied()
    }

    fn push(&mut self, table: HashMap<String, f64>) {
        self.locals.push(table);
    }

    fn pop(&mut self) {
        self.locals.pop();
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// What a `$name` expression turned out to be. Successful definitions are
/// distinguished so the statement loop can keep them off stdout.
enum FuncOutcome {
    Defined,
    Value(f64),
}

/// An element of a parenthesized list, collected before it is known whether
/// the list declares parameters or supplies arguments.
enum ListItem {
    Name(String),
    Number(f64),
}

/// Fused parser/evaluator. Three recursive-descent levels (`expr`, `term`,
/// `prim`) share the single current token and evaluate as they parse; there
/// is no intermediate tree.
pub struct Interpreter {
    lexer: Lexer,
    token: Token,
    env: Environment,
    functions: HashMap<String, Function>,
    errors: usize,
}

/// Yields one value per statement that is an expression. Definition
/// statements and empty statements yield nothing.
impl Iterator for Interpreter {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        loop {
            self.bump();
            match self.token {
                Token::End => return None,
                Token::Separator => continue,
                _ => {}
            }
            if let Some(value) = self.statement() {
                return Some(value);
            }
        }
    }
}

impl Interpreter {
    pub fn new(input: &str) -> Self {
        Interpreter {
            lexer: Lexer::new(input),
            token: Token::Separator,
            env: Environment::new(),
            functions: HashMap::new(),
            errors: 0,
        }
    }

    /// Errors encountered so far; this doubles as the process exit status.
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Advances the current token. A lexical error is reported here and
    /// replaced by a separator so the statement loop resynchronizes.
    fn bump(&mut self) {
        self.token = match self.lexer.next_token() {
            Ok(token) => token,
            Err(e) => {
                self.report(e);
                Token::Separator
            }
        };
    }

    /// Counts the error, prints it on the error channel, and returns the
    /// sentinel value that stands in for the failed (sub)expression.
    fn report(&mut self, error: CalcError) -> f64 {
        self.errors += 1;
        eprintln!("Error: \"{error}\"");
        1.0
    }

    /// Evaluates one statement starting at the current token. Returns
    /// `None` when the statement is a function definition, which prints
    /// nothing.
    fn statement(&mut self) -> Option<f64> {
        if let Token::Func(name) = &self.token {
            let name = name.clone();
            return match self.func_ref(name) {
                FuncOutcome::Defined => None,
                FuncOutcome::Value(value) => {
                    let value = self.term_rest(value);
                    Some(self.expr_rest(value))
                }
            };
        }
        Some(self.expr(true))
    }

    /// Addition and subtraction, left to right. `primed` means the leading
    /// token is already current and must not be advanced past first.
    fn expr(&mut self, primed: bool) -> f64 {
        let left = self.term(primed);
        self.expr_rest(left)
    }

    fn expr_rest(&mut self, mut left: f64) -> f64 {
        loop {
            match self.token {
                Token::Plus => left += self.term(false),
                Token::Minus => left -= self.term(false),
                _ => return left,
            }
        }
    }

    /// Multiplication, division, and exponentiation share one tier, left to
    /// right; `2 ^ 3 ^ 2` is `(2 ^ 3) ^ 2`. Division by exactly zero is an
    /// error that abandons the rest of the term.
    fn term(&mut self, primed: bool) -> f64 {
        let left = self.prim(primed);
        self.term_rest(left)
    }

    fn term_rest(&mut self, mut left: f64) -> f64 {
        loop {
            match self.token {
                Token::Star => left *= self.prim(false),
                Token::Slash => {
                    let divisor = self.prim(false);
                    if divisor == 0.0 {
                        return self.report(CalcError::DivideByZero);
                    }
                    left /= divisor;
                }
                Token::Caret => left = left.powf(self.prim(false)),
                _ => return left,
            }
        }
    }

    /// Primaries: literals, names (with optional assignment), function
    /// references, unary minus, and parenthesized expressions.
    fn prim(&mut self, primed: bool) -> f64 {
        if !primed {
            self.bump();
        }
        match self.token.clone() {
            Token::Number(value) => {
                self.bump();
                value
            }
            Token::Name(name) => {
                let value = self.env.fetch(&name);
                self.bump();
                if self.token == Token::Equal {
                    let value = self.expr(false);
                    self.env.assign(name, value);
                    value
                } else {
                    value
                }
            }
            Token::Func(name) => match self.func_ref(name) {
                FuncOutcome::Defined => 0.0,
                FuncOutcome::Value(value) => value,
            },
            Token::Minus => -self.prim(false),
            Token::LeftParen => {
                let value = self.expr(false);
                if self.token != Token::RightParen {
                    return self.report(CalcError::RightParenExpected);
                }
                self.bump();
                value
            }
            _ => self.report(CalcError::PrimaryExpected),
        }
    }

    /// Parses everything after a `$name` token. Definitions and calls share
    /// their `( name-or-number, ... )` list shape, so the list is collected
    /// first and the token after `)` decides: a brace body makes this a
    /// (re)definition, anything else calls the registered function. The
    /// lookahead uses the lexer's peek so a call consumes exactly the
    /// tokens a call should.
    fn func_ref(&mut self, name: String) -> FuncOutcome {
        let function = self.functions.get(&name).cloned();

        self.bump();
        if self.token != Token::LeftParen {
            let error = if function.is_some() {
                CalcError::CallParenExpected
            } else {
                CalcError::DefinitionParenExpected
            };
            return FuncOutcome::Value(self.report(error));
        }

        let mut items: Vec<ListItem> = Vec::new();
        loop {
            self.bump();
            match &self.token {
                Token::RightParen | Token::End => break,
                Token::Name(item) => items.push(ListItem::Name(item.clone())),
                Token::Number(value) => items.push(ListItem::Number(*value)),
                Token::Comma => {}
                _ => {
                    let error = if function.is_some() {
                        CalcError::InvalidArgument
                    } else {
                        CalcError::InvalidParameter
                    };
                    return FuncOutcome::Value(self.report(error));
                }
            }
        }

        if matches!(self.lexer.peek(), Ok(Token::Body(_))) {
            // The body becomes the current token and ends the statement.
            self.bump();
            let Token::Body(body) = self.token.clone() else {
                return FuncOutcome::Value(self.report(CalcError::MissingBody));
            };
            return self.define(name, items, body);
        }

        match function {
            Some(function) => FuncOutcome::Value(self.call(function, items)),
            None => {
                self.bump();
                FuncOutcome::Value(self.report(CalcError::MissingBody))
            }
        }
    }

    /// Registers a definition, overwriting any prior record of the same
    /// name. The list items must all be parameter names; duplicates
    /// collapse. The definition expression evaluates to nothing printable.
    fn define(&mut self, name: String, items: Vec<ListItem>, body: String) -> FuncOutcome {
        let mut params: Vec<String> = Vec::new();
        for item in items {
            let ListItem::Name(param) = item else {
                return FuncOutcome::Value(self.report(CalcError::InvalidParameter));
            };
            if !params.contains(&param) {
                params.push(param);
            }
        }

        self.functions.insert(name, Function { params, body });
        FuncOutcome::Defined
    }

    /// Calls a function: binds actuals to parameters in declaration order,
    /// seeds a local table with the bindings plus every name visible at the
    /// call site, then re-runs the statement loop over the stored body text
    /// with the lexer and active table swapped out. The value of the body's
    /// last statement is the call's result.
    fn call(&mut self, function: Function, items: Vec<ListItem>) -> f64 {
        // Actuals are bare names (looked up in the caller's active table,
        // never materialized) or literal numbers.
        let mut actuals: Vec<f64> = Vec::new();
        for item in items {
            match item {
                ListItem::Name(arg) => match self.env.value_of(&arg) {
                    Some(value) => actuals.push(value),
                    None => return self.report(CalcError::UnknownArgument),
                },
                ListItem::Number(value) => actuals.push(value),
            }
        }

        if actuals.len() != function.params.len() {
            return self.report(CalcError::ArgumentCount);
        }

        // The callee sees everything visible at the call site, but its
        // parameters shadow same-named caller variables. Writes inside the
        // body stay in the local table.
        let mut locals: HashMap<String, f64> =
            function.params.iter().cloned().zip(actuals).collect();
        for (name, value) in self.env.active() {
            locals.entry(name.clone()).or_insert(*value);
        }

        let saved = mem::replace(&mut self.lexer, Lexer::new(function.body));
        self.env.push(locals);

        // The body's last statement is its implicit return value.
        let mut value = 0.0;
        loop {
            self.bump();
            match self.token {
                Token::End => break,
                Token::Separator => continue,
                _ => value = self.expr(true),
            }
        }

        self.env.pop();
        self.lexer = saved;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> (Vec<f64>, usize) {
        let mut interpreter = Interpreter::new(input);
        let values: Vec<f64> = interpreter.by_ref().collect();
        (values, interpreter.errors())
    }

    fn run_clean(input: &str) -> Vec<f64> {
        let (values, errors) = run(input);
        assert_eq!(errors, 0, "unexpected errors for {input:?}");
        values
    }

    #[test]
    fn literal_arithmetic() {
        assert_eq!(run_clean("2 + 3 * 4"), vec![14.0]);
        assert_eq!(run_clean("10 - 2 - 3"), vec![5.0]);
        assert_eq!(run_clean("8 / 2 / 2"), vec![2.0]);
        assert_eq!(run_clean("(2 + 3) * 4"), vec![20.0]);
        assert_eq!(run_clean("1.5 * 4"), vec![6.0]);
    }

    #[test]
    fn unary_minus_binds_tighter_than_power() {
        assert_eq!(run_clean("-2 ^ 2"), vec![4.0]);
        assert_eq!(run_clean("2 * -3"), vec![-6.0]);
        assert_eq!(run_clean("--4"), vec![4.0]);
    }

    #[test]
    fn power_is_left_to_right_in_the_multiplicative_tier() {
        // (2 ^ 3) ^ 2, not 2 ^ (3 ^ 2).
        assert_eq!(run_clean("2 ^ 3 ^ 2"), vec![64.0]);
        assert_eq!(run_clean("2 * 3 ^ 2"), vec![36.0]);
    }

    #[test]
    fn statements_split_on_semicolon_and_newline() {
        assert_eq!(run_clean("1 + 1; 2 + 2\n3 + 3"), vec![2.0, 4.0, 6.0]);
        assert_eq!(run_clean("1;;\n\n2"), vec![1.0, 2.0]);
        assert_eq!(run_clean(""), vec![]);
    }

    #[test]
    fn assignment_stores_and_evaluates() {
        assert_eq!(run_clean("x = 2 + 3; x; x * 2"), vec![5.0, 5.0, 10.0]);
        assert_eq!(run_clean("x = y = 2; x + y"), vec![2.0, 4.0]);
    }

    #[test]
    fn reading_an_unknown_name_materializes_it() {
        assert_eq!(run_clean("q + 1; q"), vec![1.0, 0.0]);
    }

    #[test]
    fn pi_and_e_are_preseeded() {
        assert_eq!(run_clean("pi"), vec![std::f64::consts::PI]);
        assert_eq!(run_clean("e"), vec![std::f64::consts::E]);
        // They are ordinary variables and can be clobbered.
        assert_eq!(run_clean("pi = 3; pi"), vec![3.0, 3.0]);
    }

    #[test]
    fn divide_by_zero_yields_sentinel_and_continues() {
        let (values, errors) = run("4 / 0; 5");
        assert_eq!(values, vec![1.0, 5.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn sentinel_poisons_the_enclosing_expression() {
        // The failed term contributes 1.0 and the addition keeps going.
        let (values, errors) = run("2 + 4 / 0");
        assert_eq!(values, vec![3.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn primary_expected_errors_do_not_stop_the_run() {
        // `*` fails as a primary and stands in as 1.0; the stray operator
        // then reports once more before the statement ends.
        let (values, errors) = run("*");
        assert_eq!(values, vec![1.0]);
        assert_eq!(errors, 2);
    }

    #[test]
    fn missing_right_paren() {
        let (values, errors) = run("(2 + 3");
        assert_eq!(values, vec![1.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn definition_and_call() {
        assert_eq!(run_clean("$f(a, b){a + b}\n$f(2, 3)"), vec![5.0]);
    }

    #[test]
    fn definition_statement_yields_nothing() {
        let (values, errors) = run("$double(x){x * 2}");
        assert_eq!(values, vec![]);
        assert_eq!(errors, 0);
    }

    #[test]
    fn parameters_bind_in_declaration_order() {
        // `b` is declared first, so it takes the first actual.
        assert_eq!(run_clean("$sub(b, a){b - a}\n$sub(10, 4)"), vec![6.0]);
    }

    #[test]
    fn commas_between_arguments_are_optional() {
        assert_eq!(run_clean("$f(a, b){a + b}\n$f(2 3)"), vec![5.0]);
    }

    #[test]
    fn name_arguments_pass_their_current_value() {
        assert_eq!(run_clean("v = 7\n$f(x){x + 1}\n$f(v)"), vec![7.0, 8.0]);
    }

    #[test]
    fn unknown_name_argument_is_an_error() {
        // Argument names are never materialized; an unknown one aborts the
        // call with the sentinel.
        let (values, errors) = run("$f(x){x}\n$f(nope)");
        assert_eq!(values, vec![1.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn wrong_argument_count_is_an_error() {
        let (values, errors) = run("$f(x){x}\nz = 7\n$f(1, 2)\nz");
        // The failed call yields the sentinel; the globals are untouched.
        assert_eq!(values, vec![7.0, 1.0, 7.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn globals_are_visible_inside_a_body() {
        assert_eq!(run_clean("g = 3\n$f(x){x + g}\n$f(2)"), vec![3.0, 5.0]);
    }

    #[test]
    fn writes_inside_a_body_do_not_leak_out() {
        assert_eq!(
            run_clean("g = 3\n$f(x){g = 9; g}\n$f(1); g"),
            vec![3.0, 9.0, 3.0]
        );
    }

    #[test]
    fn parameters_shadow_same_named_caller_variables() {
        assert_eq!(run_clean("x = 5\n$f(x){x * 2}\n$f(3)"), vec![5.0, 6.0]);
    }

    #[test]
    fn nested_calls_see_the_callers_parameters() {
        assert_eq!(run_clean("$g(y){y + 1}\n$f(x){$g(x)}\n$f(4)"), vec![5.0]);
    }

    #[test]
    fn body_returns_its_last_statement() {
        assert_eq!(run_clean("$f(x){1 + 1; x * 3}\n$f(2)"), vec![6.0]);
    }

    #[test]
    fn redefinition_replaces_the_function() {
        assert_eq!(
            run_clean("$f(x){x + 1}\n$f(1)\n$f(x){x * 10}\n$f(1)"),
            vec![2.0, 10.0]
        );
    }

    #[test]
    fn zero_parameter_function() {
        assert_eq!(run_clean("$answer(){42}\n$answer()"), vec![42.0]);
    }

    #[test]
    fn call_as_a_factor() {
        assert_eq!(run_clean("$f(x){x}\n2 * $f(3)"), vec![6.0]);
    }

    #[test]
    fn call_result_feeds_an_assignment() {
        assert_eq!(
            run_clean("$f(a, b){a * b}\nr = $f(3, 4)\nr"),
            vec![12.0, 12.0]
        );
    }

    #[test]
    fn a_call_ends_its_statements_token_stream() {
        // After a call returns, the cursor holds the end-of-body marker, so
        // trailing operators start a fresh (broken) statement. Kept as-is.
        let (values, errors) = run("$f(x){x}\n$f(3) + 2");
        assert_eq!(values, vec![3.0, 3.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn missing_body_is_an_error() {
        // A failed definition is an error expression, so its sentinel
        // prints like any other statement value.
        let (values, errors) = run("$f(x) 3");
        assert_eq!(values, vec![1.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn failed_definition_does_not_register() {
        // The first line never registers `f`, so the second line is still
        // an (also bodyless) definition attempt.
        let (values, errors) = run("$f(x) 3\n$f(1)");
        assert_eq!(values, vec![1.0, 1.0]);
        assert_eq!(errors, 2);
    }

    #[test]
    fn missing_paren_in_definition_is_an_error() {
        let (values, errors) = run("$f x");
        assert_eq!(values, vec![1.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn invalid_parameter_is_an_error() {
        let (values, errors) = run("$f(1){2}");
        assert_eq!(values, vec![1.0]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn redefining_with_a_live_body_replaces_in_place() {
        // A registered name followed by a brace body is a redefinition,
        // not a call.
        let (values, errors) = run("$f(a, b){a + b}\n$f(a){a * 2}\n$f(10)");
        assert_eq!(values, vec![20.0]);
        assert_eq!(errors, 0);
    }

    #[test]
    fn bad_token_resynchronizes_at_the_next_statement() {
        let (values, errors) = run("2 + 2 @ 3; 4");
        // `@` reports and turns into a separator, ending the statement at
        // 4.0; the lone `3` then evaluates on its own, as does the `4`.
        assert_eq!(values, vec![4.0, 3.0, 4.0]);
        assert_eq!(errors, 1);
    }
}
