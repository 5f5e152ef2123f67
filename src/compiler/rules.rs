use crate::lexer::TokenKind;

use super::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    /// One level tighter; used for the right operand of left-associative
    /// operators.
    pub(super) fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

pub(super) type ParseFn<'src, 'ctx> = fn(&mut Parser<'src, 'ctx>, bool);

pub(super) struct ParseRule<'src, 'ctx> {
    pub(super) prefix: Option<ParseFn<'src, 'ctx>>,
    pub(super) infix: Option<ParseFn<'src, 'ctx>>,
    pub(super) precedence: Precedence,
}

impl<'src, 'ctx> ParseRule<'src, 'ctx> {
    fn new(
        prefix: Option<ParseFn<'src, 'ctx>>,
        infix: Option<ParseFn<'src, 'ctx>>,
        precedence: Precedence,
    ) -> Self {
        ParseRule { prefix, infix, precedence }
    }
}

pub(super) fn rule<'src, 'ctx>(kind: TokenKind) -> ParseRule<'src, 'ctx> {
    use TokenKind as T;

    match kind {
        T::LeftParen => ParseRule::new(Some(Parser::grouping), Some(Parser::call), Precedence::Call),
        T::Dot => ParseRule::new(None, Some(Parser::unsupported), Precedence::Call),
        T::Minus => ParseRule::new(Some(Parser::unary), Some(Parser::binary), Precedence::Term),
        T::Plus => ParseRule::new(None, Some(Parser::binary), Precedence::Term),
        T::Slash | T::Star => ParseRule::new(None, Some(Parser::binary), Precedence::Factor),
        T::Bang => ParseRule::new(Some(Parser::unary), None, Precedence::None),
        T::BangEqual | T::EqualEqual => ParseRule::new(None, Some(Parser::binary), Precedence::Equality),
        T::Greater | T::GreaterEqual | T::Less | T::LessEqual => {
            ParseRule::new(None, Some(Parser::binary), Precedence::Comparison)
        }
        T::Identifier => ParseRule::new(Some(Parser::variable), None, Precedence::None),
        T::String => ParseRule::new(Some(Parser::string), None, Precedence::None),
        T::Number => ParseRule::new(Some(Parser::number), None, Precedence::None),
        T::And => ParseRule::new(None, Some(Parser::and), Precedence::And),
        T::Or => ParseRule::new(None, Some(Parser::or), Precedence::Or),
        T::False | T::True | T::Null => ParseRule::new(Some(Parser::literal), None, Precedence::None),
        T::This | T::Super => ParseRule::new(Some(Parser::unsupported), None, Precedence::None),
        _ => ParseRule::new(None, None, Precedence::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_is_ordered() {
        assert!(Precedence::None < Precedence::Assignment);
        assert!(Precedence::Or < Precedence::And);
        assert!(Precedence::Term < Precedence::Factor);
        assert!(Precedence::Unary < Precedence::Call);
        assert_eq!(Precedence::Term.next(), Precedence::Factor);
        assert_eq!(Precedence::Primary.next(), Precedence::Primary);
    }

    #[test]
    fn operators_have_infix_rules() {
        for kind in [TokenKind::Plus, TokenKind::Minus, TokenKind::Star, TokenKind::Slash, TokenKind::And, TokenKind::Or] {
            assert!(rule(kind).infix.is_some(), "{kind:?}");
        }
        assert!(rule(TokenKind::Minus).prefix.is_some());
        assert!(rule(TokenKind::Equal).infix.is_none());
        assert_eq!(rule(TokenKind::Equal).precedence, Precedence::None);
        assert_eq!(rule(TokenKind::LeftParen).precedence, Precedence::Call);
    }
}
