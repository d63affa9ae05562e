//! User messages for each collaboration step

use crate::config::ResponseLanguage;
use crate::manager::CollaborationRequest;
use crate::registry::RoleConfig;
use std::fmt::Write;

/// An earlier role's output shown to a later role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorOutput {
    pub display_name: String,
    pub text: String,
}

impl PriorOutput {
    pub fn new(display_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            text: text.into(),
        }
    }
}

/// Keep at most `limit` characters, marking the cut
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

fn header(request: &CollaborationRequest, language: ResponseLanguage) -> String {
    let mut out = match language {
        ResponseLanguage::English => format!(
            "Target: {}\nAnalysis date: {}\n",
            request.target, request.analysis_date
        ),
        ResponseLanguage::Chinese => format!(
            "分析标的:{}\n分析日期:{}\n",
            request.target, request.analysis_date
        ),
    };

    if !request.context.is_empty() {
        out.push_str(match language {
            ResponseLanguage::English => "\nMarket context:\n",
            ResponseLanguage::Chinese => "\n市场背景:\n",
        });
        for (key, value) in &request.context {
            let _ = writeln!(out, "- {key}: {value}");
        }
    }
    out
}

fn prior_section(prior: &[PriorOutput], heading: &str, char_limit: usize) -> String {
    let mut out = format!("\n{heading}\n");
    for output in prior {
        let _ = write!(
            out,
            "\n### {}\n{}\n",
            output.display_name,
            truncate_chars(&output.text, char_limit)
        );
    }
    out
}

/// Main analysis request; `prior` carries earlier roles' outputs in sequential mode
pub fn analysis_prompt(
    request: &CollaborationRequest,
    role: &RoleConfig,
    prior: &[PriorOutput],
    language: ResponseLanguage,
    char_limit: usize,
) -> String {
    let mut out = header(request, language);

    if !prior.is_empty() {
        let heading = match language {
            ResponseLanguage::English => "Findings from earlier analysts:",
            ResponseLanguage::Chinese => "前序分析师的结论:",
        };
        out.push_str(&prior_section(prior, heading, char_limit));
    }

    let _ = match language {
        ResponseLanguage::English => write!(
            out,
            "\nAs the {}, analyze {} from your specialty. Build on or challenge the earlier findings where relevant, and end with a clear conclusion.",
            role.display_name, request.target
        ),
        ResponseLanguage::Chinese => write!(
            out,
            "\n请以{}的身份,从你的专业角度分析{}。如有必要,可引用或质疑前序结论,最后给出明确结论。",
            role.display_name, request.target
        ),
    };
    out
}

/// Shorter request used for the retry after a failed call
pub fn simplified_prompt(
    request: &CollaborationRequest,
    role: &RoleConfig,
    language: ResponseLanguage,
) -> String {
    match language {
        ResponseLanguage::English => format!(
            "Target: {}\nAs the {}, give a brief analysis (at most five bullet points) and a one-line conclusion.",
            request.target, role.display_name
        ),
        ResponseLanguage::Chinese => format!(
            "分析标的:{}\n请以{}的身份给出简要分析(不超过五条要点)和一句话结论。",
            request.target, role.display_name
        ),
    }
}

/// One debate turn; `others` holds the latest arguments of the other participants
pub fn debate_prompt(
    request: &CollaborationRequest,
    role: &RoleConfig,
    round: u32,
    total_rounds: u32,
    others: &[PriorOutput],
    language: ResponseLanguage,
    char_limit: usize,
) -> String {
    let mut out = header(request, language);

    let _ = match language {
        ResponseLanguage::English => write!(out, "\nDebate round {round} of {total_rounds}.\n"),
        ResponseLanguage::Chinese => write!(out, "\n辩论第{round}轮(共{total_rounds}轮)。\n"),
    };

    if others.is_empty() {
        let _ = match language {
            ResponseLanguage::English => write!(
                out,
                "\nAs the {}, open the debate with your position on {} and the evidence for it.",
                role.display_name, request.target
            ),
            ResponseLanguage::Chinese => write!(
                out,
                "\n请以{}的身份开启辩论,陈述你对{}的立场及依据。",
                role.display_name, request.target
            ),
        };
        return out;
    }

    let heading = match language {
        ResponseLanguage::English => "Latest arguments from the other side:",
        ResponseLanguage::Chinese => "其他参与者的最新观点:",
    };
    out.push_str(&prior_section(others, heading, char_limit));

    let _ = match language {
        ResponseLanguage::English => write!(
            out,
            "\nAs the {}, respond to these arguments point by point, concede what is right, and restate your position.",
            role.display_name
        ),
        ResponseLanguage::Chinese => write!(
            out,
            "\n请以{}的身份逐条回应上述观点,承认其合理之处,并重申你的立场。",
            role.display_name
        ),
    };
    out
}
