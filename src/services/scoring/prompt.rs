use std::fmt::Write;

use crate::db::models::{PracticeTask, Submission};
use crate::db::types::ModuleType;

const BAND_SCALE: &str = "\
- 9.0: Expert user
- 8.0-8.5: Very good user
- 7.0-7.5: Good user
- 6.0-6.5: Competent user
- 5.0-5.5: Modest user
- 4.0-4.5: Limited user
- 3.0-3.5: Extremely limited user
- 2.0-2.5: Intermittent user
- 1.0-1.5: Non-user";

/// Label and descriptor of the first criterion, which depends on the task.
fn task_criterion(task: &PracticeTask) -> (&'static str, &'static str) {
    match (task.task_number, task.module_type) {
        (1, ModuleType::Academic) => (
            "Task Achievement",
            "How well the response addresses the task requirements, presents key features, \
             and makes appropriate comparisons",
        ),
        (1, ModuleType::General) => (
            "Task Achievement",
            "How well the response addresses the task requirements, covers all bullet points, \
             and uses appropriate tone and format",
        ),
        _ => (
            "Task Response",
            "How well the response addresses the task, presents a clear position, and develops \
             arguments with relevant examples",
        ),
    }
}

pub(super) fn word_count_status(word_count: i32, task: &PracticeTask) -> &'static str {
    if word_count < task.word_limit_min {
        "Under minimum"
    } else if word_count > task.word_limit_max {
        "Over maximum"
    } else {
        "Within range"
    }
}

pub(crate) fn build_prompt(submission: &Submission, task: &PracticeTask) -> String {
    let module = task.module_type.label();
    let task_label = format!("Task {}", task.task_number);
    let (criterion, criterion_description) = task_criterion(task);

    let mut prompt = String::with_capacity(submission.content.len() + 4096);

    // Writing into a String cannot fail.
    let _ = write!(
        prompt,
        "You are an expert IELTS examiner assessing {module} Writing {task_label}. \
         Assess the response below against the official IELTS Writing criteria.\n\n\
         TASK INFORMATION:\n\
         - Module: {module}\n\
         - Task: {task_label}\n\
         - Task Code: {code}\n\
         - Title: {title}\n\
         - Word Limit: {min}-{max} words\n\
         - Actual Word Count: {words} words\n\n\
         TASK PROMPT:\n{task_prompt}\n\n",
        code = task.task_code,
        title = task.title,
        min = task.word_limit_min,
        max = task.word_limit_max,
        words = submission.word_count,
        task_prompt = task.prompt,
    );

    if !task.instruction.trim().is_empty() {
        let _ = write!(prompt, "TASK INSTRUCTIONS:\n{}\n\n", task.instruction);
    }

    let _ = write!(
        prompt,
        "STUDENT RESPONSE:\n{content}\n\n\
         ASSESSMENT CRITERIA (each weighted 25%):\n\
         1. {criterion}: {criterion_description}\n\
         2. Coherence and Cohesion: logical organisation, clear progression, linking devices, paragraphing\n\
         3. Lexical Resource: range and accuracy of vocabulary, word choice, spelling\n\
         4. Grammatical Range and Accuracy: range of structures, accuracy, punctuation\n\n\
         SCORING SCALE (1.0-9.0 in 0.5 increments):\n{BAND_SCALE}\n\n\
         SPECIAL CONSIDERATIONS:\n\
         - Word count: {status}\n\
         - Penalties apply for significant under or over length\n\
         - Task type specific requirements must be met\n\n\
         REQUIRED OUTPUT FORMAT:\n\
         Respond with a single JSON object and nothing else:\n\
         {{\n  \
           \"overall_score\": X.X,\n  \
           \"task_achievement\": X.X,\n  \
           \"coherence_cohesion\": X.X,\n  \
           \"lexical_resource\": X.X,\n  \
           \"grammar_accuracy\": X.X,\n  \
           \"confidence\": 0.XX,\n  \
           \"feedback\": [\n    \
             {{\"type\": \"overall\", \"title\": \"Overall Assessment\", \"content\": \"...\", \"severity\": \"info\"}},\n    \
             {{\"type\": \"task_achievement\", \"title\": \"{criterion}\", \"content\": \"...\", \"severity\": \"info\"}},\n    \
             {{\"type\": \"coherence_cohesion\", \"title\": \"Coherence and Cohesion\", \"content\": \"...\", \"severity\": \"info\"}},\n    \
             {{\"type\": \"lexical_resource\", \"title\": \"Lexical Resource\", \"content\": \"...\", \"severity\": \"info\"}},\n    \
             {{\"type\": \"grammar_accuracy\", \"title\": \"Grammatical Range and Accuracy\", \"content\": \"...\", \"severity\": \"info\"}},\n    \
             {{\"type\": \"inline\", \"title\": \"...\", \"content\": \"...\", \"severity\": \"warning\", \
               \"highlighted_text\": \"...\", \"text_start_position\": 0, \"text_end_position\": 0, \"suggestion\": \"...\"}},\n    \
             {{\"type\": \"suggestion\", \"title\": \"Key Areas for Improvement\", \"content\": \"...\", \"severity\": \"suggestion\"}}\n  \
           ]\n\
         }}\n\n\
         Allowed severities: info, suggestion, warning, error. Character positions refer to the \
         student response and must satisfy text_end_position >= text_start_position.",
        content = submission.content,
        status = word_count_status(submission.word_count, task),
    );

    prompt
}
