
use std::fmt;
use std::io;

use miette::{GraphicalReportHandler, GraphicalTheme};

use mica_core::database::DatabaseError;

use crate::elaborator::ElabError;

#[derive(Debug)]
pub enum MicaError {
    Elaborator(ElabError),
    Database(DatabaseError),
    External(anyhow::Error),
    Collection(Vec<MicaError>)
}

impl fmt::Display for MicaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MicaError::Elaborator(error) => {
                let mut output = String::new();
                GraphicalReportHandler::new_themed(GraphicalTheme::unicode())
                    .with_width(80)
                    .render_report(&mut output, error)?;
                write!(f, "{}", output)
            }
            MicaError::Database(error) => error.fmt(f),
            MicaError::External(error) => error.fmt(f),
            MicaError::Collection(errors) => {
                for error in errors.iter() {
                    writeln!(f, "{}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl From<ElabError> for MicaError {
    fn from(error: ElabError) -> Self {
        MicaError::Elaborator(error)
    }
}

impl From<DatabaseError> for MicaError {
    fn from(error: DatabaseError) -> Self {
        MicaError::Database(error)
    }
}

impl From<io::Error> for MicaError {
    fn from(error: io::Error) -> Self {
        MicaError::External(error.into())
    }
}

impl From<anyhow::Error> for MicaError {
    fn from(error: anyhow::Error) -> Self {
        MicaError::External(error)
    }
}
