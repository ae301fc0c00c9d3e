//! Role prompts and per-step instructions

pub const STUDENT_ROLE: &str = "You are the Student. Your goal is to understand the document \
in the system context deeply by asking the Teacher precise, probing questions. Read the \
document carefully, look for gaps in your understanding, and let each answer lead you to a \
sharper question. When the Observer gives guidance, follow it.";

pub const TEACHER_ROLE: &str = "You are the Teacher. Answer the Student's questions about the \
document in the system context accurately and thoroughly, grounding every answer in the \
document. Give context and examples where they help. When the Observer gives guidance, follow \
it.";

pub const OBSERVER_ROLE: &str = "You are the Observer. You review the discussion between the \
Student and the Teacher about the document in the system context, find where it stalls or \
stays shallow, and give each of them concrete guidance for the next rounds.";

fn with_guidance(insights: &str, purpose: &str, body: String) -> String {
    if insights.is_empty() {
        body
    } else {
        format!(
            "Follow these observer insights when {purpose}:\n#Observer Insights#\n{insights}\n#End Observer Insights#\n\n{body}"
        )
    }
}

pub fn opening_questions(count: usize) -> String {
    format!(
        r#"Generate {count} questions about the document. The questions are answered by experts and serve in doctoral research, so they must be specific and reveal deep insights; avoid generic questions such as "What is this document about?".

Each question has:
- title: a short title
- prompt: the question itself, at most 50 words, with no introductory sentence
- category: one word describing the kind of question

Respond with a JSON array only, no other text:
[{{"title": "...", "prompt": "...", "category": "..."}}]"#
    )
}

pub fn follow_up_questions(count: usize, teacher_response: &str, insights: &str) -> String {
    let body = format!(
        r#"Generate {count} concise questions that deepen the understanding of the document, based on the Teacher's response below. Do not refer to the response itself.

Respond with a JSON array of strings only, no other text:
["...", "..."]

#Teacher Response#
{teacher_response}
#End Teacher Response#"#
    );
    with_guidance(insights, "generating questions", body)
}

pub fn follow_up_unanswered(count: usize, questions: &str, insights: &str) -> String {
    let body = format!(
        r#"Generate {count} concise questions that deepen the understanding of the document, building on your previous questions below. Do not repeat them.

Respond with a JSON array of strings only, no other text:
["...", "..."]

#Previous Questions#
{questions}
#End Previous Questions#"#
    );
    with_guidance(insights, "generating questions", body)
}

pub fn answer_questions(questions: &str, insights: &str) -> String {
    let body = format!(
        r#"Answer each question below in the context of the document. Keep every answer concise and informative.

Respond with a JSON array only, one object per question in the same order, no other text:
[{{"question": "...", "answer": "..."}}]

#Questions#
{questions}
#End Questions#"#
    );
    with_guidance(insights, "answering questions", body)
}

pub fn review_history(history: &str) -> String {
    format!(
        r"Review the conversation below and write instructions that help the Student ask better questions and the Teacher give better answers about the document. Give only instructions, no other text, in this format:

<Instructions>
<Student>Instructions for the Student</Student>
<Teacher>Instructions for the Teacher</Teacher>
</Instructions>

#Conversation#
{history}
#End Conversation#"
    )
}
