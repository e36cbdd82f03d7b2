/// Builds the single text part sent to the model for a document.
pub fn summary_prompt(document_text: &str) -> String {
    format!(
        "Summarize the following document.\n\
         Structure the summary as:\n\
         1. Overview: two or three sentences on what the document is about.\n\
         2. Key points: the main points, one per line.\n\
         3. Conclusion: outcomes, decisions or action items, if any.\n\
         Write plain text only. Do not use markdown, bold text or bullet symbols.\n\
         \n\
         Document:\n\
         {}",
        document_text
    )
}
