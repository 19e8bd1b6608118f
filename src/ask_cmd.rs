//! `nyay ask`: run the pipeline once from the terminal.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::extract::UploadedInput;
use crate::models::AnswerResult;
use crate::pipeline::AppServices;
use crate::session::{self, RequestScope};

pub async fn run_ask(
    config: &Config,
    question: &str,
    file: Option<PathBuf>,
    session_id: Option<String>,
    json: bool,
) -> Result<()> {
    let upload = file
        .as_deref()
        .map(UploadedInput::from_path)
        .transpose()?;

    let mut scope = match session_id.as_deref() {
        Some(id) => {
            session::validate_session_id(id)?;
            RequestScope::detached(id)
        }
        None => RequestScope::ephemeral(),
    };

    let services = AppServices::from_config(config.clone())?;
    let result = services
        .pipeline
        .ask_question_with_doc(question, upload.as_ref(), &mut scope)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_answer(&result);
    }
    Ok(())
}

fn print_answer(result: &AnswerResult) {
    println!("{}", result.answer);
    println!();
    println!("  mode:       {}", result.mode);
    println!("  confidence: {}", result.confidence);
    if !result.sources.is_empty() {
        println!("  sources:    {}", result.sources.join(", "));
    }
    if let Some(error) = &result.error {
        println!("  error:      {}", error);
    }
    if let Some(disclaimer) = &result.disclaimer {
        println!();
        println!("{}", disclaimer);
    }
}
