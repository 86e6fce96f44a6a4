pub const VALIDATE_IMAGE: &str = "Decide whether this photo shows food or a meal that can be \
identified. Answer success=true when it does. Otherwise answer success=false and set error to \
IMAGE_IS_INAPPROPRIATE for offensive content, POLICY_VIOLATION for content you must not \
process, NOT_ENOUGH_INFORMATION when the food cannot be made out, or IMAGE_VALIDATION_FAILED \
when the photo does not show food at all.";

pub const DESCRIBE_IMAGE: &str = "Describe the meal in this photo in one or two plain \
sentences. Name every dish and visible ingredient and estimate portion sizes in grams or \
millilitres. Put the text in user_description and set success=true. If no food is visible set \
success=false.";

/// Asks whether a typed description carries enough detail to analyze.
pub fn validate_description(description: &str) -> String {
    format!(
        "A user typed the following description of something they ate:\n\
         \"{description}\"\n\
         Answer success=true if it names at least one food or drink. Otherwise answer \
         success=false with error NOT_ENOUGH_INFORMATION, or POLICY_VIOLATION if the text is \
         abusive or unrelated to eating."
    )
}

/// Builds the extraction instruction. The reply format here is what
/// [`crate::analysis::parser::parse_analysis_text`] understands.
pub fn meal_analysis(description: &str) -> String {
    format!(
        "Analyze this meal: \"{description}\"\n\
         List the likely ingredients and any potential dietary triggers \
         (common allergens or irritants such as gluten, lactose, nuts, shellfish, soy, egg, \
         caffeine, alcohol, spicy food, high FODMAP foods).\n\
         Put exactly one string in generated_prompt, formatted like this:\n\
         Ingredients:\n\
         <Ingredient name> | <quantity><unit>\n\
         <Ingredient name> | <quantity><unit>\n\
         \n\
         Triggers:\n\
         <trigger>, <trigger>\n\
         Rules:\n\
         - one ingredient per line, name and quantity separated by a single '|'\n\
         - quantity is a number directly followed by a unit such as g, ml or pcs\n\
         - never use '|' anywhere else\n\
         - triggers are comma separated on a single line; write none if there are none"
    )
}
