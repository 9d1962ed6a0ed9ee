//! Provide the error reporter, the common component through which every stage reports
//! diagnostics.
//!
//! Reports go to the handler set as the `error-handler` property, or to
//! [`DefaultErrorHandler`] which prints them to stderr. A fatal error stops the parse
//! unless `continue-after-fatal-error` is set.

use std::{cell::RefCell, rc::Rc};

use crate::{
    component::{XmlComponent, XmlComponentManager, XmlProperty},
    constants::{CONTINUE_AFTER_FATAL_ERROR, ERROR_HANDLER, LOCALE, PARSER_SETTINGS},
    error::{XmlConfigurationError, XmlErrorCode, XmlErrorLevel, XmlParseError, XniError},
    xni::{XmlErrorHandler, XmlLocation},
};

/// Print diagnostics to stderr, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl XmlErrorHandler for DefaultErrorHandler {
    fn warning(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        eprintln!("{error}");
        Ok(())
    }

    fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        eprintln!("{error}");
        Ok(())
    }

    fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        eprintln!("{error}");
        Ok(())
    }
}

#[doc(alias = "XMLErrorReporter")]
pub struct XmlErrorReporter {
    handler: Option<Rc<RefCell<dyn XmlErrorHandler>>>,
    default_handler: DefaultErrorHandler,
    continue_after_fatal: bool,
    locale: Option<String>,
    counts: [usize; 3],
    configured: bool,
}

impl Default for XmlErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlErrorReporter {
    const RECOGNIZED_FEATURES: &[&str] = &[CONTINUE_AFTER_FATAL_ERROR];
    const RECOGNIZED_PROPERTIES: &[&str] = &[ERROR_HANDLER, LOCALE];

    pub fn new() -> Self {
        Self {
            handler: None,
            default_handler: DefaultErrorHandler,
            continue_after_fatal: false,
            locale: None,
            counts: [0; 3],
            configured: false,
        }
    }

    pub fn set_locale(&mut self, locale: Option<String>) {
        self.locale = locale;
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn set_error_handler(&mut self, handler: Option<Rc<RefCell<dyn XmlErrorHandler>>>) {
        self.handler = handler;
    }

    pub fn continue_after_fatal(&self) -> bool {
        self.continue_after_fatal
    }

    /// The number of reports of `level` since the last reset.
    pub fn count(&self, level: XmlErrorLevel) -> usize {
        self.counts[level as usize]
    }

    /// Report a diagnostic. A fatal error is returned as `Err` unless
    /// `continue-after-fatal-error` is set.
    pub fn report(
        &mut self,
        location: XmlLocation,
        code: XmlErrorCode,
        args: &[&str],
        level: XmlErrorLevel,
    ) -> Result<(), XniError> {
        let error = self.deliver(location, code, args, level)?;
        if level == XmlErrorLevel::Fatal && !self.continue_after_fatal {
            return Err(XniError::Parse(error));
        }
        Ok(())
    }

    /// Report a diagnostic without ever stopping the parse for it.
    ///
    /// An `Err` returned by the error handler is still passed through.
    pub fn report_unescalated(
        &mut self,
        location: XmlLocation,
        code: XmlErrorCode,
        args: &[&str],
        level: XmlErrorLevel,
    ) -> Result<(), XniError> {
        self.deliver(location, code, args, level).map(|_| ())
    }

    fn deliver(
        &mut self,
        location: XmlLocation,
        code: XmlErrorCode,
        args: &[&str],
        level: XmlErrorLevel,
    ) -> Result<XmlParseError, XniError> {
        let error = XmlParseError {
            code,
            level,
            message: code.format(args),
            location,
        };
        self.counts[level as usize] += 1;
        match &self.handler {
            Some(handler) => {
                let mut handler = handler
                    .try_borrow_mut()
                    .map_err(|_| XniError::Pipeline("the error handler is already in use".into()))?;
                dispatch(&mut *handler, &error)?;
            }
            None => dispatch(&mut self.default_handler, &error)?,
        }
        Ok(error)
    }
}

fn dispatch(handler: &mut dyn XmlErrorHandler, error: &XmlParseError) -> Result<(), XniError> {
    match error.level {
        XmlErrorLevel::Warning => handler.warning(error),
        XmlErrorLevel::Error => handler.error(error),
        XmlErrorLevel::Fatal => handler.fatal_error(error),
    }
}

impl XmlComponent for XmlErrorReporter {
    fn recognized_features(&self) -> &[&'static str] {
        Self::RECOGNIZED_FEATURES
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        (feature_id == CONTINUE_AFTER_FATAL_ERROR).then_some(false)
    }

    fn recognized_properties(&self) -> &[&'static str] {
        Self::RECOGNIZED_PROPERTIES
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.counts = [0; 3];
        if self.configured && !manager.feature_or(PARSER_SETTINGS, true) {
            return Ok(());
        }
        self.continue_after_fatal = manager.feature_or(CONTINUE_AFTER_FATAL_ERROR, false);
        self.handler = match manager.property(ERROR_HANDLER) {
            Some(XmlProperty::ErrorHandler(handler)) => Some(handler),
            _ => None,
        };
        if let Some(XmlProperty::Locale(locale)) = manager.property(LOCALE) {
            self.locale = Some(locale);
        }
        self.configured = true;
        Ok(())
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        if feature_id == CONTINUE_AFTER_FATAL_ERROR {
            self.continue_after_fatal = state;
        }
        Ok(())
    }

    fn set_property(
        &mut self,
        property_id: &str,
        value: &XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        match (property_id, value) {
            (ERROR_HANDLER, XmlProperty::ErrorHandler(handler)) => {
                self.handler = Some(handler.clone())
            }
            (LOCALE, XmlProperty::Locale(locale)) => self.locale = Some(locale.clone()),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<(XmlErrorLevel, String)>);

    impl XmlErrorHandler for Collect {
        fn warning(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.0.push((error.level, error.message.clone()));
            Ok(())
        }

        fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.0.push((error.level, error.message.clone()));
            Ok(())
        }

        fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.0.push((error.level, error.message.clone()));
            Ok(())
        }
    }

    #[test]
    fn fatal_escalation_test() {
        let collect = Rc::new(RefCell::new(Collect::default()));
        let mut reporter = XmlErrorReporter::new();
        reporter.set_error_handler(Some(collect.clone()));
        reporter
            .report(
                XmlLocation::default(),
                XmlErrorCode::ElementNotDeclared,
                &["a"],
                XmlErrorLevel::Error,
            )
            .unwrap();
        let err = reporter
            .report(
                XmlLocation::default(),
                XmlErrorCode::PrematureEof,
                &[],
                XmlErrorLevel::Fatal,
            )
            .unwrap_err();
        assert!(matches!(err, XniError::Parse(e) if e.code == XmlErrorCode::PrematureEof));
        assert!(
            reporter
                .report_unescalated(
                    XmlLocation::default(),
                    XmlErrorCode::PrematureEof,
                    &[],
                    XmlErrorLevel::Fatal,
                )
                .is_ok()
        );
        reporter.set_feature(CONTINUE_AFTER_FATAL_ERROR, true).unwrap();
        assert!(
            reporter
                .report(
                    XmlLocation::default(),
                    XmlErrorCode::PrematureEof,
                    &[],
                    XmlErrorLevel::Fatal,
                )
                .is_ok()
        );
        let collected = &collect.borrow().0;
        assert_eq!(collected.len(), 4);
        assert_eq!(collected[0], (XmlErrorLevel::Error, "Element type \"a\" must be declared.".to_owned()));
        assert_eq!(reporter.count(XmlErrorLevel::Fatal), 3);
    }
}
