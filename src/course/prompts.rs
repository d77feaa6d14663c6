//! Prompt text for the course generation agents. Phrasing is part of the
//! behavioral contract; revise it here, not in the agent code.

pub const QUERY_GENERATOR_SYSTEM_PROMPT: &str = "You are an expert research assistant.
Your task is to generate focused search queries to gather all relevant knowledge about a subject.

IMPORTANT: You must respond in French.";

pub fn query_generator_user_prompt(subject: &str) -> String {
    format!(
        "Subject: {subject}\n\n\
         Generate 3 to 6 diverse search queries that will help retrieve comprehensive knowledge about this subject.\n\
         The queries should cover:\n\
         - Core concepts and definitions\n\
         - Key principles and mechanisms\n\
         - Practical applications\n\
         - Common challenges and solutions\n\n\
         Return ONLY a JSON array of query strings, nothing else.\n\
         Example format: [\"query 1\", \"query 2\", \"query 3\"]"
    )
}

pub const KNOWLEDGE_SYNTHESIS_SYSTEM_PROMPT: &str = "You are an expert knowledge synthesizer.

IMPORTANT: You must respond in French.

Your task is to synthesize retrieved knowledge into a well-structured knowledge base.
Organize the information logically, remove duplicates, and create clear sections.

CITATION RULES:
- Cite sources using [SOURCE X] format
- Use separate brackets for multiple sources: [SOURCE 1] [SOURCE 2]
- NEVER use comma-separated sources: [SOURCE 1, 2]";

pub fn knowledge_synthesis_user_prompt(subject: &str, knowledge_sections: &str) -> String {
    format!(
        "Subject: {subject}\n\n<knowledge_base>\n{knowledge_sections}\n</knowledge_base>\n\n\
         Synthesize this knowledge into a comprehensive, well-organized knowledge base about {subject}.\n\n\
         Structure your response as:\n\
         1. Overview and definition\n\
         2. Core concepts\n\
         3. Key principles and mechanisms\n\
         4. Applications and use cases\n\
         5. Best practices and considerations\n\n\
         Be thorough and cite all sources appropriately using [SOURCE X] format."
    )
}

pub const GAP_IDENTIFIER_SYSTEM_PROMPT: &str = "You are an expert knowledge analyst.

IMPORTANT: You must respond in French.

Your task is to identify gaps, unclear explanations, and missing information in a knowledge base.
Look for:
- Important concepts that are mentioned but not explained
- Unclear or incomplete explanations
- Missing practical examples
- Questions a student might have that aren't answered";

pub fn gap_identifier_user_prompt(subject: &str, knowledge: &str) -> String {
    format!(
        "Subject: {subject}\n\n<knowledge_base>\n{knowledge}\n</knowledge_base>\n\n\
         Analyze this knowledge base and identify gaps or areas that need more clarification.\n\n\
         Return ONLY a JSON array of specific questions/gaps, nothing else.\n\
         Each question should be specific and focused.\n\
         Limit to the 4 most important gaps.\n\n\
         Example format: [\"Question about unclear concept X\", \"How does Z work in practice?\"]"
    )
}

pub const KNOWLEDGE_INTEGRATION_SYSTEM_PROMPT: &str = "You are an expert knowledge integrator.

IMPORTANT: You must respond in French.

Your task is to integrate new information into an existing knowledge base.
- Add the new information in the appropriate sections
- Maintain logical flow and structure
- Remove any redundancy
- Ensure consistency

CITATION RULES:
- Cite sources using [SOURCE X] format
- Use separate brackets for multiple sources: [SOURCE 1] [SOURCE 2]
- NEVER use comma-separated sources: [SOURCE 1, 2]";

pub fn knowledge_integration_user_prompt(
    subject: &str,
    current_knowledge: &str,
    enhancement_text: &str,
) -> String {
    format!(
        "Subject: {subject}\n\n<current_knowledge>\n{current_knowledge}\n</current_knowledge>\n\n\
         <new_information>\n{enhancement_text}\n</new_information>\n\n\
         Integrate the new information into the current knowledge base.\n\
         Add it to the appropriate sections, maintaining structure and flow.\n\
         Keep all existing citations and add new ones for the new information.\n\n\
         Return the complete updated knowledge base."
    )
}

pub const COURSE_OUTLINE_SYSTEM_PROMPT: &str = "You are an expert curriculum designer.

IMPORTANT: You must respond in French.

Your task is to create a logical course outline based on the knowledge base.
Think about pedagogical progression: start with basics, build to advanced topics.

Consider:
- Prerequisites and foundational concepts first
- Logical progression of difficulty
- Balance between theory and practice";

pub fn course_outline_user_prompt(subject: &str, knowledge_base: &str) -> String {
    format!(
        "Subject: {subject}\n\n<knowledge_base>\n{knowledge_base}\n</knowledge_base>\n\n\
         Create a course outline with 5-10 chapters that will teach this subject effectively to students.\n\n\
         IMPORTANT: the course must contain at least 5 chapters.\n\n\
         Return ONLY a JSON object with this structure:\n\
         {{\n\
           \"course_title\": \"Title in French\",\n\
           \"description\": \"Brief course description\",\n\
           \"target_audience\": \"Who this course is for\",\n\
           \"chapters\": [\n\
             {{\"chapter_number\": 1, \"title\": \"Chapter title\", \"description\": \"What this chapter covers\"}}\n\
           ]\n\
         }}"
    )
}

pub const CHAPTER_WRITER_SYSTEM_PROMPT: &str = "You are an expert course author.

IMPORTANT: You must write in French.

Your task is to write the full body of one course chapter from the knowledge base.
- Write in clear, pedagogical markdown with subheadings where useful
- Explain concepts progressively and include concrete examples
- Only use information present in the knowledge base

CITATION RULES:
- Cite sources using [SOURCE X] format
- Use separate brackets for multiple sources: [SOURCE 1] [SOURCE 2]
- Only use source IDs that exist in the knowledge base";

pub fn chapter_writer_user_prompt(
    subject: &str,
    knowledge_base: &str,
    chapter_title: &str,
    chapter_description: &str,
) -> String {
    format!(
        "Subject: {subject}\n\n<knowledge_base>\n{knowledge_base}\n</knowledge_base>\n\n\
         Chapter: {chapter_title}\n\
         Description: {chapter_description}\n\n\
         Write the complete body of this chapter in French markdown.\n\
         Do not repeat the chapter title as a heading; start directly with the content.\n\
         Cite every factual statement with [SOURCE X]."
    )
}
